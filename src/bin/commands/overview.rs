use super::output::{log_ingest, print_json, print_overview, OverviewReport};
use super::utils::load_session;
use super::InputArgs;
use spotify_history::AnalyzerConfig;

/// Handle the overview command
pub fn handle_overview(
    input: &InputArgs,
    json: bool,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = load_session(input, config)?;
    log_ingest(session.report());

    let report = OverviewReport::new(session.overview(), session.events());
    if json {
        print_json(&report)?;
    } else {
        print_overview(&report);
    }
    Ok(())
}
