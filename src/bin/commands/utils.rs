use super::InputArgs;
use spotify_history::{
    refresh_access_token, AccessToken, AnalyzerConfig, InputFormat, RefreshCredentials, Session,
};
use std::env;
use std::path::Path;

/// Pick the input format: the explicit flag wins, then the file extension.
pub fn resolve_format(
    path: &Path,
    explicit: Option<InputFormat>,
) -> Result<InputFormat, Box<dyn std::error::Error>> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(InputFormat::from_extension)
        .ok_or_else(|| {
            format!(
                "Cannot infer the format of {}; pass --format tabular or --format nested",
                path.display()
            )
            .into()
        })
}

fn is_tsv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"))
}

/// Read, parse and normalize an export into a session.
pub fn load_session(
    input: &InputArgs,
    config: &AnalyzerConfig,
) -> Result<Session, Box<dyn std::error::Error>> {
    let format = resolve_format(&input.file, input.format)?;

    let mut config = config.clone();
    if is_tsv(&input.file) {
        config.parser = config.parser.with_delimiter('\t');
    }

    let text = std::fs::read_to_string(&input.file)
        .map_err(|e| format!("Failed to read {}: {e}", input.file.display()))?;
    let name = input
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.file.display().to_string());

    log::info!("Loading {name} as {format}");
    let session = Session::from_text(&name, &text, format, &config)?;
    Ok(session)
}

/// Get an access token from the environment.
///
/// `SPOTIFY_ACCESS_TOKEN` is used as-is. Otherwise a new token is requested
/// with `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and
/// `SPOTIFY_REFRESH_TOKEN`.
pub async fn get_access_token(
    config: &AnalyzerConfig,
) -> Result<AccessToken, Box<dyn std::error::Error>> {
    if let Ok(token) = env::var("SPOTIFY_ACCESS_TOKEN") {
        log::debug!("Using access token from SPOTIFY_ACCESS_TOKEN");
        return Ok(AccessToken::new(token));
    }

    let client_id = env::var("SPOTIFY_CLIENT_ID")
        .map_err(|_| "Neither SPOTIFY_ACCESS_TOKEN nor SPOTIFY_CLIENT_ID is set")?;
    let client_secret = env::var("SPOTIFY_CLIENT_SECRET")
        .map_err(|_| "SPOTIFY_CLIENT_SECRET environment variable not set")?;
    let refresh_token = env::var("SPOTIFY_REFRESH_TOKEN")
        .map_err(|_| "SPOTIFY_REFRESH_TOKEN environment variable not set")?;

    println!("🔐 Refreshing access token...");
    let credentials = RefreshCredentials::new(client_id, client_secret, refresh_token);
    let http_client = http_client::native::NativeClient::new();
    let token = refresh_access_token(
        &http_client,
        &config.api.accounts_url,
        &credentials,
        config.api.timeout_secs,
    )
    .await?;
    Ok(token)
}

/// Format milliseconds as `1h 02m`, `3m 05s` or `42s`.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(42_500), "42s");
        assert_eq!(format_duration(185_000), "3m 05s");
        assert_eq!(format_duration(3_720_000), "1h 02m");
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(
            resolve_format(Path::new("history.TSV"), None).unwrap(),
            InputFormat::Tabular
        );
        assert_eq!(
            resolve_format(Path::new("StreamingHistory0.json"), None).unwrap(),
            InputFormat::Nested
        );
        assert_eq!(
            resolve_format(Path::new("export"), Some(InputFormat::Nested)).unwrap(),
            InputFormat::Nested
        );
        assert!(resolve_format(Path::new("export.xlsx"), None).is_err());
        assert!(is_tsv(Path::new("a.tsv")));
        assert!(!is_tsv(Path::new("a.csv")));
    }
}
