use regex::Regex;

lazy_static::lazy_static! {
    /// `https://<service>-<4 digits>[-<suffix>].twil.io/<path>`; groups: service, -suffix, suffix, path.
    pub static ref FUNCTION_URL_RE: Regex =
        Regex::new(r"^https://(\S+)-[0-9]{4}(-(\S+))?\.twil\.io(/\S*)$").unwrap();
    pub static ref WORKFLOW_NAME_RE: Regex =
        Regex::new(r#""workflowName"\s*:\s*"([^"]*)""#).unwrap();
    pub static ref CHANNEL_NAME_RE: Regex =
        Regex::new(r#""channelName"\s*:\s*"([^"]*)""#).unwrap();
    pub static ref SHELL_VAR_RE: Regex = Regex::new(r"\$([a-zA-Z_][a-zA-Z0-9_]*)").unwrap();
}

/// Anchor a user-supplied service pattern so it has to match the whole service name.
pub fn anchored_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
