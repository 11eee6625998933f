use std::path::Path;

use cftrack_core::models::NewStudent;
use cftrack_core::Student;

use crate::cli::StudentCommands;
use crate::commands::common::{
    format_student_lines, format_timestamp, open_database, resolve_student, short_id,
    student_to_list_item, StudentListItem,
};
use crate::error::CliError;

pub async fn run_student(command: StudentCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        StudentCommands::Add {
            name,
            email,
            handle,
            phone,
        } => run_add(name, email, handle, phone, db_path).await,
        StudentCommands::List { limit, json } => run_list(limit, json, db_path).await,
        StudentCommands::Show { student, json } => run_show(&student, json, db_path).await,
        StudentCommands::Remove { student } => run_remove(&student, db_path).await,
        StudentCommands::SetHandle { student, handle } => {
            run_set_handle(&student, handle, db_path).await
        }
    }
}

pub async fn run_add(
    name: String,
    email: String,
    handle: Option<String>,
    phone: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = db
        .create_student(Student::new(NewStudent {
            name,
            email,
            phone,
            cf_handle: handle,
            ..NewStudent::default()
        }))
        .await?;

    println!("Added {} ({})", student.name, short_id(&student.id.to_string()));
    Ok(())
}

pub async fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let students = db.list_students(limit, 0).await?;

    if as_json {
        let json_items = students
            .iter()
            .map(student_to_list_item)
            .collect::<Vec<StudentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if students.is_empty() {
        println!("No students yet. Add one with `cftrack student add`.");
        return Ok(());
    }

    for line in format_student_lines(&students) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_show(student: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = resolve_student(student, &db).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&student_to_list_item(&student))?
        );
        return Ok(());
    }

    println!("ID:         {}", student.id);
    println!("Name:       {}", student.name);
    println!("Email:      {}", student.email);
    println!("Phone:      {}", student.phone.as_deref().unwrap_or("-"));
    println!("Handle:     {}", student.handle().unwrap_or("-"));
    println!(
        "Rating:     {} (max {})",
        student.current_rating, student.max_rating
    );
    println!("Active:     {}", if student.is_active { "yes" } else { "no" });
    println!(
        "Last sync:  {}",
        student
            .last_sync
            .map_or_else(|| "never".to_string(), format_timestamp)
    );
    Ok(())
}

pub async fn run_remove(student: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = resolve_student(student, &db).await?;
    db.delete_student(&student.id).await?;
    println!("Removed {} ({})", student.name, short_id(&student.id.to_string()));
    Ok(())
}

pub async fn run_set_handle(
    student: &str,
    handle: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let student = resolve_student(student, &db).await?;
    let updated = db.set_student_handle(&student.id, handle).await?;

    match updated.handle() {
        Some(handle) => println!("{} now syncs as {handle}", updated.name),
        None => println!("Cleared handle for {}", updated.name),
    }
    Ok(())
}
