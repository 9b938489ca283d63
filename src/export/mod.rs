use crate::models::chat::Conversation;
use chrono::{ NaiveDate, SecondsFormat, Utc };
use log::info;
use std::fmt;
use std::path::{ Path, PathBuf };
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported export format: {0}")]
    Unsupported(String),

    #[error("Failed to serialize conversation: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Json,
    Md,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Txt,
        ExportFormat::Json,
        ExportFormat::Md,
        ExportFormat::Pdf,
        ExportFormat::Csv,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Md => "md",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "Text (.txt)",
            ExportFormat::Json => "JSON (.json)",
            ExportFormat::Md => "Markdown (.md)",
            ExportFormat::Csv => "CSV (.csv)",
            ExportFormat::Pdf => "PDF (.pdf)",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Txt),
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Md),
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub filename: String,
    pub mime_type: &'static str,
    pub content: Vec<u8>,
}

pub fn export(conversation: &Conversation, format: ExportFormat) -> Result<ExportedFile, ExportError> {
    export_dated(conversation, format, Utc::now().date_naive())
}

/// Same as [`export`] with an explicit date for the file name.
pub fn export_dated(
    conversation: &Conversation,
    format: ExportFormat,
    date: NaiveDate
) -> Result<ExportedFile, ExportError> {
    let (content, mime_type) = match format {
        ExportFormat::Txt => (transcript(conversation), "text/plain"),
        ExportFormat::Json => (serde_json::to_string_pretty(conversation)?, "application/json"),
        ExportFormat::Md => (markdown(conversation), "text/markdown"),
        ExportFormat::Csv => (csv(conversation), "text/csv"),
        // No layout has been decided for PDF; refuse instead of writing an empty file.
        ExportFormat::Pdf => {
            return Err(ExportError::Unsupported(format.extension().to_string()));
        }
    };
    Ok(ExportedFile {
        filename: format!("conversation_{}.{}", date.format("%Y-%m-%d"), format.extension()),
        mime_type,
        content: content.into_bytes(),
    })
}

/// `ROLE: content` per message, separated by blank lines.
pub fn transcript(conversation: &Conversation) -> String {
    conversation.messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn markdown(conversation: &Conversation) -> String {
    let body = conversation.messages
        .iter()
        .map(|m| format!("## {}\n\n{}\n", m.role.display_name(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("# {}\n\n{}", conversation.title, body)
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv(conversation: &Conversation) -> String {
    let rows = conversation.messages
        .iter()
        .map(|m| {
            format!(
                "{},{},{}",
                csv_field(m.role.as_str()),
                csv_field(&m.content),
                csv_field(&m.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Role,Content,Timestamp\n{}", rows)
}

/// Writes the export into `dir` and returns the full path.
pub async fn save(dir: impl AsRef<Path>, file: &ExportedFile) -> Result<PathBuf, ExportError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&file.filename);
    tokio::fs::write(&path, &file.content).await?;
    info!("Exported {} ({} bytes) to {}", file.mime_type, file.content.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use chrono::TimeZone;

    fn sample() -> Conversation {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("Where is the nearest cafe?"));
        conv.push(ChatMessage::assistant("Two blocks north."));
        conv
    }

    fn text(file: &ExportedFile) -> String {
        String::from_utf8(file.content.clone()).unwrap()
    }

    #[test]
    fn txt_lists_roles_in_upper_case() {
        let file = export(&sample(), ExportFormat::Txt).unwrap();
        assert_eq!(text(&file), "USER: Where is the nearest cafe?\n\nASSISTANT: Two blocks north.");
        assert_eq!(file.mime_type, "text/plain");
    }

    #[test]
    fn markdown_has_title_and_role_headings() {
        let file = export(&sample(), ExportFormat::Md).unwrap();
        assert_eq!(
            text(&file),
            "# Where is the nearest cafe?\n\n## User\n\nWhere is the nearest cafe?\n\n## Assistant\n\nTwo blocks north.\n"
        );
    }

    #[test]
    fn csv_doubles_embedded_quotes() {
        let mut conv = Conversation::new();
        let mut msg = ChatMessage::user("He said \"hi\"");
        msg.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        conv.push(msg);
        let file = export(&conv, ExportFormat::Csv).unwrap();
        assert_eq!(
            text(&file),
            "Role,Content,Timestamp\n\"user\",\"He said \"\"hi\"\"\",\"2024-05-01T12:30:00.000Z\""
        );
    }

    #[test]
    fn empty_conversation_exports() {
        let conv = Conversation::new();
        assert_eq!(text(&export(&conv, ExportFormat::Txt).unwrap()), "");
        assert_eq!(text(&export(&conv, ExportFormat::Csv).unwrap()), "Role,Content,Timestamp\n");
    }

    #[test]
    fn json_round_trips() {
        let conv = sample();
        let file = export(&conv, ExportFormat::Json).unwrap();
        let parsed: Conversation = serde_json::from_slice(&file.content).unwrap();
        assert_eq!(parsed.messages, conv.messages);
        assert_eq!(parsed.title, conv.title);
        assert_eq!(parsed.message_count, conv.message_count);

        let raw: serde_json::Value = serde_json::from_slice(&file.content).unwrap();
        assert_eq!(raw["messageCount"], 2);
        assert_eq!(raw["messages"][0]["role"], "user");
    }

    #[test]
    fn pdf_is_refused() {
        let err = export(&sample(), ExportFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExportError::Unsupported(ref f) if f == "pdf"));
    }

    #[test]
    fn filename_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let file = export_dated(&sample(), ExportFormat::Md, date).unwrap();
        assert_eq!(file.filename, "conversation_2025-03-09.md");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(".md".parse::<ExportFormat>().unwrap(), ExportFormat::Md);
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn save_writes_into_directory() {
        let dir = std::env::temp_dir().join(format!("adk-chat-export-{}", uuid::Uuid::new_v4()));
        let file = export(&sample(), ExportFormat::Txt).unwrap();
        let path = save(&dir, &file).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), file.content);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
