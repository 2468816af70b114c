use super::output::{log_ingest, print_overview, print_ranking, OverviewReport};
use chrono::{DateTime, Utc};
use spotify_history::{
    parse_records, sample, AggregateRequest, AnalyzerConfig, DataSource, GroupBy, InputFormat,
    Metric, ParserConfig, Session,
};

/// Handle the sample command
pub fn handle_sample(
    count: usize,
    seed: u64,
    end: DateTime<Utc>,
    top_n: usize,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🎲 Generating {count} sample plays (seed {seed})");
    let document = sample::generate_json(count, seed, end)?;

    // Generated data always uses the export's key names
    let records = parse_records(&document, InputFormat::Nested, &ParserConfig::default())?
        .collect::<spotify_history::Result<Vec<_>>>()?;
    let mut session = Session::from_records(DataSource::Sample { seed }, records, config)?;
    log_ingest(session.report());

    print_overview(&OverviewReport::new(session.overview(), session.events()));

    for group_by in [GroupBy::Track, GroupBy::Artist] {
        println!();
        let summary = session.summarize(&AggregateRequest::new(Metric::Plays, group_by, top_n))?;
        print_ranking(summary);
    }
    Ok(())
}
