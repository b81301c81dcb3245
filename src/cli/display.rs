use console::{Style, style};
use serde_json::Value;

use crate::command::ExecutionResult;
use crate::model::Status;
use crate::nlp::Clarification;

pub struct Display;

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_result(&self, result: &ExecutionResult) {
        if result.success {
            self.print_success(&result.message);
        } else {
            self.print_error(&result.message);
        }

        if let Some(entities) = result.data.get("entities").and_then(Value::as_array) {
            self.print_entities_table(entities);
        } else if let Some(entity) = result.data.get("entity") {
            self.print_entity(entity);
        }

        if let Some(failed) = result.data.get("failed").and_then(Value::as_array) {
            for item in failed {
                println!(
                    "  {} {} #{}: {}",
                    style("✗").red(),
                    item["entity_type"].as_str().unwrap_or("?"),
                    item["id"],
                    item["error"].as_str().unwrap_or("")
                );
            }
        }
    }

    pub fn print_clarification(&self, clarification: &Clarification) {
        self.print_warning(&clarification.message);
        for score in &clarification.scores {
            println!(
                "    {:<12} {}",
                score.stage.to_string(),
                style(score.confidence).dim()
            );
        }
    }

    fn print_entity(&self, entity: &Value) {
        let status = entity["status"].as_str().unwrap_or("");
        println!(
            "  {} #{}  {}",
            style(entity["entity_type"].as_str().unwrap_or("")).bold(),
            entity["id"],
            style(entity["name"].as_str().unwrap_or("")).white()
        );
        println!("    Status: {}", self.status_style(status).apply_to(status));
        if let Some(priority) = entity.get("priority").and_then(Value::as_str) {
            println!("    Priority: {}", priority);
        }
        if let Some(description) = entity.get("description").and_then(Value::as_str) {
            println!("    {}", style(description).dim());
        }
    }

    fn print_entities_table(&self, entities: &[Value]) {
        if entities.is_empty() {
            println!("{}", style("Nothing found.").dim());
            return;
        }

        println!(
            "{:<8} {:<36} {:<12} {:<10}",
            style("ID").bold(),
            style("Name").bold(),
            style("Status").bold(),
            style("Priority").bold()
        );
        println!("{}", style("─".repeat(68)).dim());

        for entity in entities {
            let status = entity["status"].as_str().unwrap_or("");
            let name: String = entity["name"].as_str().unwrap_or("").chars().take(34).collect();
            println!(
                "{:<8} {:<36} {:<12} {:<10}",
                entity["id"],
                name,
                self.status_style(status).apply_to(status),
                entity["priority"].as_str().unwrap_or("-")
            );
        }
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", style("→").cyan(), message);
    }

    fn status_style(&self, status: &str) -> Style {
        match status.parse::<Status>() {
            Ok(Status::Pending) => Style::new().dim(),
            Ok(Status::InProgress) => Style::new().yellow().bold(),
            Ok(Status::Blocked) => Style::new().magenta(),
            Ok(Status::Completed) => Style::new().green(),
            Ok(Status::Cancelled) => Style::new().dim().strikethrough(),
            Err(()) => Style::new(),
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
