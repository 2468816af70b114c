use super::output::{log_ingest, print_json, print_ranking, print_trend};
use super::utils::load_session;
use super::{InputArgs, RankArgs};
use spotify_history::{AggregateRequest, AnalyzerConfig, Granularity, GroupBy, Metric};

/// Handle the top command
pub fn handle_top(
    input: &InputArgs,
    rank: &RankArgs,
    json: bool,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = load_session(input, config)?;
    log_ingest(session.report());

    let request = AggregateRequest::new(rank.metric, rank.group_by, rank.top_n);
    let summary = session.summarize(&request)?;

    if json {
        print_json(summary)?;
    } else {
        print_ranking(summary);
    }
    Ok(())
}

/// Handle the trend command
pub fn handle_trend(
    input: &InputArgs,
    granularity: Granularity,
    json: bool,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if granularity == Granularity::None {
        return Err("trend needs --granularity day, week or month".into());
    }

    let mut session = load_session(input, config)?;
    log_ingest(session.report());

    let request = AggregateRequest::new(Metric::Plays, GroupBy::Track, 1).with_trend(granularity);
    let summary = session.summarize(&request)?;
    let points = summary.trend.as_deref().unwrap_or_default();

    if json {
        print_json(&points)?;
    } else {
        print_trend(points, granularity);
    }
    Ok(())
}
