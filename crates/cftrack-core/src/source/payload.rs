//! Validation of Codeforces API payloads.
//!
//! Responses are decoded into loose `Raw*` shapes first and then checked
//! field by field, so one malformed item costs that item and not the page.

use serde::Deserialize;
use serde_json::Value;

use super::{ExternalRatingChange, ExternalSubmission, SourceError, SourceResult};
use crate::util::compact_text;

/// Items that passed validation plus a count of the ones that did not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub rejected: usize,
}

impl<T> Parsed<T> {
    /// Number of items the judge actually sent
    pub fn fetched(&self) -> usize {
        self.items.len() + self.rejected
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    comment: Option<String>,
    result: Option<Value>,
}

/// Unwrap the `{status, comment, result}` envelope every API method returns.
pub fn parse_envelope(http_status: u16, body: &str) -> SourceResult<Value> {
    let Ok(envelope) = serde_json::from_str::<Envelope>(body) else {
        return Err(unstructured_error(http_status, body));
    };

    match envelope.status.as_deref() {
        Some("OK") => envelope.result.ok_or_else(|| {
            SourceError::InvalidPayload("response status OK without a result".to_string())
        }),
        Some(_) => Err(SourceError::Api(
            envelope
                .comment
                .map(|comment| comment.trim().to_string())
                .filter(|comment| !comment.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
        )),
        None if http_status >= 500 => Err(unstructured_error(http_status, body)),
        None => Err(SourceError::InvalidPayload(
            "response did not include a status".to_string(),
        )),
    }
}

fn unstructured_error(http_status: u16, body: &str) -> SourceError {
    let trimmed = compact_text(body);
    let detail = if trimmed.is_empty() {
        format!("HTTP {http_status}")
    } else {
        format!("{trimmed} ({http_status})")
    };

    match http_status {
        429 | 500..=u16::MAX => SourceError::Unavailable(detail),
        200..=299 => SourceError::InvalidPayload(detail),
        _ => SourceError::Api(detail),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubmission {
    id: Option<Value>,
    contest_id: Option<Value>,
    creation_time_seconds: Option<Value>,
    problem: Option<RawProblem>,
    author: Option<RawParty>,
    programming_language: Option<String>,
    verdict: Option<String>,
    passed_test_count: Option<Value>,
    time_consumed_millis: Option<Value>,
    memory_consumed_bytes: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProblem {
    contest_id: Option<Value>,
    index: Option<String>,
    name: Option<String>,
    rating: Option<Value>,
    #[serde(default)]
    tags: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParty {
    participant_type: Option<String>,
}

impl TryFrom<RawSubmission> for ExternalSubmission {
    type Error = String;

    fn try_from(raw: RawSubmission) -> Result<Self, String> {
        let id = integer(raw.id.as_ref())
            .filter(|id| *id > 0)
            .ok_or("missing or invalid id")?;
        let creation_time_seconds = integer(raw.creation_time_seconds.as_ref())
            .filter(|seconds| *seconds >= 0)
            .ok_or_else(|| format!("submission {id} has no creationTimeSeconds"))?;
        let problem = raw
            .problem
            .ok_or_else(|| format!("submission {id} has no problem"))?;
        let problem_index = problem
            .index
            .map(|index| index.trim().to_string())
            .filter(|index| !index.is_empty())
            .ok_or_else(|| format!("submission {id} has no problem index"))?;

        let contest_id =
            integer(raw.contest_id.as_ref()).or_else(|| integer(problem.contest_id.as_ref()));
        let tags = problem
            .tags
            .into_iter()
            .filter_map(|tag| match tag {
                Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect();

        Ok(Self {
            id,
            contest_id,
            problem_index,
            problem_name: problem.name,
            problem_rating: integer(problem.rating.as_ref()).unwrap_or(0),
            tags,
            verdict: raw.verdict,
            creation_time_seconds,
            language: raw.programming_language,
            time_consumed_ms: integer(raw.time_consumed_millis.as_ref()).unwrap_or(0),
            memory_consumed_bytes: integer(raw.memory_consumed_bytes.as_ref()).unwrap_or(0),
            passed_test_count: integer(raw.passed_test_count.as_ref()),
            participant_type: raw.author.and_then(|author| author.participant_type),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRatingChange {
    contest_id: Option<Value>,
    contest_name: Option<String>,
    rank: Option<Value>,
    old_rating: Option<Value>,
    new_rating: Option<Value>,
    rating_update_time_seconds: Option<Value>,
}

impl TryFrom<RawRatingChange> for ExternalRatingChange {
    type Error = String;

    fn try_from(raw: RawRatingChange) -> Result<Self, String> {
        let contest_id = integer(raw.contest_id.as_ref()).ok_or("missing contestId")?;
        let rank = integer(raw.rank.as_ref())
            .ok_or_else(|| format!("contest {contest_id} has no rank"))?;
        let rating_update_time_seconds = integer(raw.rating_update_time_seconds.as_ref())
            .ok_or_else(|| format!("contest {contest_id} has no ratingUpdateTimeSeconds"))?;

        Ok(Self {
            contest_id,
            contest_name: raw.contest_name,
            rank,
            old_rating: integer(raw.old_rating.as_ref()).unwrap_or(0),
            new_rating: integer(raw.new_rating.as_ref()).unwrap_or(0),
            rating_update_time_seconds,
        })
    }
}

/// Validate a `user.status` result, keeping the judge's order.
pub fn parse_submissions(result: Value) -> SourceResult<Parsed<ExternalSubmission>> {
    parse_list::<RawSubmission, ExternalSubmission>(result, "submission")
}

/// Validate a `user.rating` result, keeping the judge's order.
pub fn parse_rating_history(result: Value) -> SourceResult<Parsed<ExternalRatingChange>> {
    parse_list::<RawRatingChange, ExternalRatingChange>(result, "rating change")
}

fn parse_list<R, T>(result: Value, what: &str) -> SourceResult<Parsed<T>>
where
    R: for<'de> Deserialize<'de>,
    T: TryFrom<R, Error = String>,
{
    let Value::Array(entries) = result else {
        return Err(SourceError::InvalidPayload(format!(
            "expected a list of {what} items"
        )));
    };

    let mut parsed = Parsed {
        items: Vec::with_capacity(entries.len()),
        rejected: 0,
    };
    for (position, entry) in entries.into_iter().enumerate() {
        let item = serde_json::from_value::<R>(entry)
            .map_err(|error| error.to_string())
            .and_then(T::try_from);
        match item {
            Ok(item) => parsed.items.push(item),
            Err(reason) => {
                tracing::warn!("Skipping malformed {} at position {}: {}", what, position, reason);
                parsed.rejected += 1;
            }
        }
    }
    Ok(parsed)
}

/// Lenient integer read: JSON numbers (floats truncated) or numeric strings.
#[allow(clippy::cast_possible_truncation)]
fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
