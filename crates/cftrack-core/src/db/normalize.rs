//! Write-time normalization.
//!
//! Every record passes through one of these functions right before the
//! repositories write it: text is trimmed, defaults are filled, bounds are
//! checked and the insertion timestamp is stamped.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{ContestParticipation, Student, Submission};
use crate::util::normalize_text_option;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 50;
const HANDLE_MIN_CHARS: usize = 3;
const CONTEST_NAME_MAX_CHARS: usize = 255;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("Invalid regex"));
static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,15}$").expect("Invalid regex"));

/// Validate and canonicalize a student before insert or update.
pub fn normalize_student(mut student: Student, now: i64) -> Result<Student> {
    student.name = student.name.trim().to_string();
    let name_len = student.name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
        return Err(Error::InvalidInput(format!(
            "Name must be {NAME_MIN_CHARS} to {NAME_MAX_CHARS} characters"
        )));
    }

    student.email = student.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&student.email) {
        return Err(Error::InvalidInput("Email is invalid".into()));
    }

    student.phone = normalize_text_option(student.phone);
    if let Some(phone) = &student.phone {
        if !PHONE_RE.is_match(phone) {
            return Err(Error::InvalidInput(
                "Phone number must be 10 to 15 digits".into(),
            ));
        }
    }

    student.cf_handle = normalize_handle(student.cf_handle)?;

    if student.current_rating < 0 || student.max_rating < 0 {
        return Err(Error::InvalidInput("Ratings must be non-negative".into()));
    }

    student.updated_at = now;
    Ok(student)
}

/// Trim and validate an optional Codeforces handle.
pub fn normalize_handle(handle: Option<String>) -> Result<Option<String>> {
    let Some(handle) = normalize_text_option(handle) else {
        return Ok(None);
    };
    if handle.chars().count() < HANDLE_MIN_CHARS {
        return Err(Error::InvalidInput(format!(
            "Handle must be at least {HANDLE_MIN_CHARS} characters"
        )));
    }
    if !HANDLE_RE.is_match(&handle) {
        return Err(Error::InvalidInput(format!(
            "Invalid Codeforces handle: {handle}"
        )));
    }
    Ok(Some(handle))
}

/// Fill defaults on a staged submission and stamp its insertion time.
pub fn normalize_submission(mut submission: Submission, now: i64) -> Submission {
    submission.problem_id = submission.problem_id.trim().to_string();
    submission.problem_name = normalize_text_option(Some(submission.problem_name))
        .unwrap_or_else(|| "Unknown Problem".to_string());
    submission.language = normalize_text_option(Some(submission.language))
        .unwrap_or_else(|| "Unknown".to_string());
    submission.problem_rating = submission.problem_rating.max(0);
    submission.time_ms = submission.time_ms.max(0);
    submission.memory_bytes = submission.memory_bytes.max(0);
    submission.problem_tags = submission
        .problem_tags
        .into_iter()
        .filter_map(|tag| normalize_text_option(Some(tag)))
        .collect();
    submission.created_at = now;
    submission
}

/// Clamp and trim a staged contest participation and stamp its insertion time.
pub fn normalize_contest(mut contest: ContestParticipation, now: i64) -> ContestParticipation {
    contest.contest_name = normalize_text_option(contest.contest_name)
        .map(|name| name.chars().take(CONTEST_NAME_MAX_CHARS).collect());
    contest.rank = contest.rank.max(1);
    contest.old_rating = contest.old_rating.max(0);
    contest.new_rating = contest.new_rating.max(0);
    contest.problems_solved = contest.problems_solved.max(0);
    contest.created_at = now;
    contest
}
