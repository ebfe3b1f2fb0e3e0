use std::fmt;

/// A `PUT file://<path> @<stage>` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCommand {
    pub file_path: String,
    pub stage: String,
    pub auto_compress: bool,
    pub overwrite: bool,
}

impl PutCommand {
    pub fn new(file_path: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            stage: stage.into(),
            auto_compress: true,
            overwrite: false,
        }
    }

    pub fn auto_compress(mut self, auto_compress: bool) -> Self {
        self.auto_compress = auto_compress;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Stage name without a leading `@`.
    pub fn stage_name(&self) -> &str {
        self.stage.strip_prefix('@').unwrap_or(&self.stage)
    }
}

fn needs_quoting(path: &str) -> bool {
    path.chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | ';' | '\\'))
}

impl fmt::Display for PutCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = format!("file://{}", self.file_path);
        if needs_quoting(&self.file_path) {
            let escaped = location.replace('\\', "\\\\").replace('\'', "\\'");
            write!(f, "PUT '{escaped}'")?;
        } else {
            write!(f, "PUT {location}")?;
        }
        write!(
            f,
            " @{} auto_compress={}",
            self.stage_name(),
            self.auto_compress
        )?;
        if self.overwrite {
            write!(f, " overwrite=true")?;
        }
        write!(f, ";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_statement_format() {
        let command = PutCommand::new("videos/2024-01-01.csv", "STG_VIDEO");
        assert_eq!(
            command.to_string(),
            "PUT file://videos/2024-01-01.csv @STG_VIDEO auto_compress=true;"
        );
    }

    #[test]
    fn test_absolute_path_keeps_three_slashes() {
        let command = PutCommand::new("/tmp/upload.json", "STG_VIDEO");
        assert_eq!(
            command.to_string(),
            "PUT file:///tmp/upload.json @STG_VIDEO auto_compress=true;"
        );
    }

    #[test]
    fn test_stage_prefix_is_not_doubled() {
        let command = PutCommand::new("a.csv", "@MY_DB.MY_SCHEMA.MY_STAGE");
        assert_eq!(command.stage_name(), "MY_DB.MY_SCHEMA.MY_STAGE");
        assert_eq!(
            command.to_string(),
            "PUT file://a.csv @MY_DB.MY_SCHEMA.MY_STAGE auto_compress=true;"
        );
    }

    #[test]
    fn test_options_are_appended() {
        let command = PutCommand::new("a.csv", "STG")
            .auto_compress(false)
            .overwrite(true);
        assert_eq!(
            command.to_string(),
            "PUT file://a.csv @STG auto_compress=false overwrite=true;"
        );
    }

    #[test]
    fn test_paths_with_spaces_and_quotes_are_quoted() {
        let command = PutCommand::new("/tmp/my file's.csv", "STG");
        assert_eq!(
            command.to_string(),
            r"PUT 'file:///tmp/my file\'s.csv' @STG auto_compress=true;"
        );
    }
}
