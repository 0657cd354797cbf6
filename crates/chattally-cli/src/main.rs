mod config;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chattally_core::codec::{self, Document};
use chattally_core::report::{self, PeriodSeries};
use chattally_core::{
    ChatLog, Classifier, Sentiment, TimeDivider, TimePeriod, TimeRangeCount, UsageKind,
};
use clap::{Parser, Subcommand};
use config::ChattallyConfig;

#[derive(Parser)]
#[command(name = "chattally")]
#[command(author, version, about = "Chat log usage statistics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable debug logging")]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Analyze a chat export and save the counts")]
    Analyze {
        #[arg(help = "Export file or directory of message_<n>.json files")]
        input: PathBuf,
        #[arg(short, long, default_value = "analysis.json", help = "Where to write the analysis")]
        output: PathBuf,
        #[arg(short, long, help = "all, year, month, week or day")]
        period: Option<String>,
        #[arg(long, help = "Skip sentiment scoring")]
        no_sentiment: bool,
        #[arg(long, help = "Keep text exactly as exported")]
        no_repair: bool,
        #[arg(long, help = "Disable progress bar")]
        no_progress: bool,
    },
    #[command(about = "Show per-period, per-participant statistics")]
    Report {
        analysis: PathBuf,
        #[arg(long, help = "Output as JSON")]
        json: bool,
        #[arg(long)]
        top: Option<usize>,
    },
    #[command(about = "Show the most used items in each period")]
    Usage {
        analysis: PathBuf,
        #[arg(short, long, help = "sticker, photo, link, emoji, word, react-given, react-received")]
        kind: UsageKind,
        #[arg(long)]
        top: Option<usize>,
        #[arg(long, default_value = "0", help = "Skip items shorter than this")]
        min_length: usize,
        #[arg(long, help = "Clamp counts above this value")]
        outlier_cap: Option<u64>,
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    #[command(about = "Show the all-time top items with each participant's share")]
    Top {
        analysis: PathBuf,
        #[arg(short, long, default_value = "sticker")]
        kind: UsageKind,
        #[arg(long)]
        top: Option<usize>,
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    #[command(about = "Show messages sent per participant per period")]
    Activity {
        analysis: PathBuf,
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    #[command(about = "Show reaction density per period")]
    Reacts {
        analysis: PathBuf,
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    #[command(about = "Show cosine similarity of participants' usage")]
    Similarity {
        analysis: PathBuf,
        #[arg(short, long, default_value = "sticker")]
        kind: UsageKind,
        #[arg(long, help = "Ignore items used fewer times than this")]
        min_count: Option<u64>,
        #[arg(long, help = "Compare each participant with everyone else")]
        exclude_self: bool,
        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        use tracing_subscriber::EnvFilter;

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let config = ChattallyConfig::load();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            period,
            no_sentiment,
            no_repair,
            no_progress,
        } => {
            let period = period.as_deref().unwrap_or(&config.period);
            let period: TimePeriod = period.parse()?;
            let options = AnalyzeOptions {
                period,
                sentiment: config.sentiment.enabled && !no_sentiment,
                repair: config.repair_encoding && !no_repair,
                progress: !no_progress,
            };
            run_analyze(&input, &output, options, config)
        }
        Commands::Report {
            analysis,
            json,
            top,
        } => run_report(&analysis, json, top.unwrap_or(config.top)),
        Commands::Usage {
            analysis,
            kind,
            top,
            min_length,
            outlier_cap,
            json,
        } => run_usage(
            &analysis,
            kind,
            top.unwrap_or(config.top),
            min_length,
            outlier_cap,
            json,
        ),
        Commands::Top {
            analysis,
            kind,
            top,
            json,
        } => run_top(&analysis, kind, top.unwrap_or(config.top), json),
        Commands::Activity { analysis, json } => run_activity(&analysis, json),
        Commands::Reacts { analysis, json } => run_reacts(&analysis, json),
        Commands::Similarity {
            analysis,
            kind,
            min_count,
            exclude_self,
            json,
        } => run_similarity(
            &analysis,
            kind,
            min_count.unwrap_or(config.similarity_min_count),
            exclude_self,
            json,
        ),
    }
}

struct AnalyzeOptions {
    period: TimePeriod,
    sentiment: bool,
    repair: bool,
    progress: bool,
}

fn run_analyze(
    input: &Path,
    output: &Path,
    options: AnalyzeOptions,
    config: &ChattallyConfig,
) -> Result<()> {
    use colored::Colorize;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;

    let start = Instant::now();
    let mut chat =
        ChatLog::load(input).with_context(|| format!("Failed to load {}", input.display()))?;
    if options.repair {
        chat.repair_encoding();
    }

    let mut classifier = Classifier::new();
    if options.sentiment {
        classifier = classifier.with_sentiment(config.sentiment_analyzer());
    }

    let total = chat.messages.len() as u64;
    let bar = if options.progress {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} messages")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(pb)
    } else {
        None
    };

    let analysis = chattally_core::analyze(&chat, options.period, classifier, |done, _| {
        if let Some(pb) = &bar {
            pb.set_position(done as u64);
        }
    });
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    codec::save(output, &analysis.divider)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "\n  {} {} messages into {} {} buckets",
        "Analyzed".green().bold(),
        total,
        analysis.divider.len(),
        options.period.describe()
    );
    if let Some(title) = &chat.title {
        println!("  {}", format!("Chat: {title}").bright_black());
    }
    if !analysis.diagnostics.is_empty() {
        println!(
            "  {}",
            format!(
                "{} messages or reactions could not be fully counted (use --debug for details)",
                analysis.diagnostics.len()
            )
            .yellow()
        );
        for diagnostic in &analysis.diagnostics {
            tracing::debug!("{diagnostic}");
        }
    }
    println!("  Saved to {}", output.display().to_string().cyan());
    println!(
        "{}",
        format!("  Processing time: {}ms", start.elapsed().as_millis()).bright_black()
    );
    Ok(())
}

fn load_document(path: &Path) -> Result<Document> {
    codec::load(path).with_context(|| format!("Failed to read analysis {}", path.display()))
}

fn load_divider(path: &Path) -> Result<TimeDivider> {
    Ok(load_document(path)?.into_divider()?)
}

/// The all-time aggregate of a divider, or the bare time range itself.
fn aggregate(doc: &Document) -> &TimeRangeCount {
    match doc {
        Document::Divider(divider) => divider.all_time(),
        Document::TimeRange(trc) => trc,
    }
}

fn format_ratio(value: f64) -> String {
    format!("{value:.3}")
}

fn format_items(items: &[(String, u64)]) -> String {
    items
        .iter()
        .map(|(item, count)| format!("{item} ({count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_sentiment(sentiment: Option<Sentiment>) -> String {
    sentiment
        .map(|s| format!("{:+.2} / {:.2}", s.polarity, s.subjectivity))
        .unwrap_or_else(|| "-".to_string())
}

fn new_table(header: Vec<String>) -> comfy_table::Table {
    use comfy_table::{ContentArrangement, Table};

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn run_report(analysis: &Path, json: bool, top: usize) -> Result<()> {
    use colored::Colorize;

    let divider = load_divider(analysis)?;
    let reports = report::bucket_reports(&divider, top);

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for bucket in &reports {
        println!(
            "\n  {} {}",
            bucket.label.cyan().bold(),
            format!("({})", bucket.range).bright_black()
        );

        let mut table = new_table(
            [
                "Participant",
                "Messages",
                "Stickers/msg",
                "Photos/msg",
                "Links/msg",
                "Reacts/msg",
                "Reacts given",
                "Words",
                "Top stickers",
                "Top reacts",
                "Sentiment",
            ]
            .map(String::from)
            .to_vec(),
        );
        let rows = bucket
            .participants
            .iter()
            .map(|(name, s)| (name.as_str(), s))
            .chain(std::iter::once(("everyone", &bucket.everyone)));
        for (name, s) in rows {
            table.add_row(vec![
                name.to_string(),
                s.messages.to_string(),
                format_ratio(s.stickers_per_message),
                format_ratio(s.photos_per_message),
                format_ratio(s.links_per_message),
                format_ratio(s.reacts_per_message),
                s.reacts_given.to_string(),
                s.words.to_string(),
                format_items(&s.top_stickers),
                format_items(&s.top_reacts),
                format_sentiment(s.mean_sentiment),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}

fn run_usage(
    analysis: &Path,
    kind: UsageKind,
    top: usize,
    min_length: usize,
    outlier_cap: Option<u64>,
    json: bool,
) -> Result<()> {
    use colored::Colorize;

    let divider = load_divider(analysis)?;
    let rankings = report::period_rankings(&divider, kind, top, min_length, outlier_cap);

    if json {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
        return Ok(());
    }

    if rankings.is_empty() {
        println!("\n  {}", format!("No {} usage recorded", kind.name()).yellow());
        return Ok(());
    }

    let mut header = vec!["Period".to_string()];
    header.extend((1..=top).map(|rank| format!("#{rank}")));
    let mut table = new_table(header);
    for ranking in &rankings {
        let mut row = vec![ranking.period.label.clone()];
        for rank in 0..top {
            row.push(match ranking.items.get(rank) {
                Some(item) if item.outlier => {
                    format!("{} ({} > {})", item.item, item.raw_count, item.count)
                }
                Some(item) => format!("{} ({})", item.item, item.count),
                None => String::new(),
            });
        }
        table.add_row(row);
    }

    println!(
        "\n  {} most used {} items",
        divider.period().describe().cyan().bold(),
        kind.name()
    );
    println!("{table}");
    Ok(())
}

fn run_top(analysis: &Path, kind: UsageKind, top: usize, json: bool) -> Result<()> {
    use colored::Colorize;

    let doc = load_document(analysis)?;
    let breakdown = report::top_items_by_participant(aggregate(&doc), kind, top);

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    let mut header = vec!["Item".to_string(), "Total".to_string()];
    header.extend(breakdown.participants.keys().cloned());
    let mut table = new_table(header);
    for (i, (item, total)) in breakdown.items.iter().enumerate() {
        let mut row = vec![item.clone(), total.to_string()];
        row.extend(breakdown.participants.values().map(|uses| uses[i].to_string()));
        table.add_row(row);
    }

    println!(
        "\n  {} {}",
        format!("Most common {} items", breakdown.kind).cyan().bold(),
        format!("({})", breakdown.range).bright_black()
    );
    println!("{table}");
    Ok(())
}

fn print_series<T>(title: &str, series: &PeriodSeries<T>, cell: impl Fn(&T) -> String) {
    use colored::Colorize;

    if series.is_empty() {
        println!("\n  {}", format!("{title}: no data").yellow());
        return;
    }

    let mut header = vec!["Period".to_string()];
    header.extend(series.series.keys().cloned());
    let mut table = new_table(header);
    for (i, period) in series.periods.iter().enumerate() {
        let mut row = vec![period.label.clone()];
        row.extend(series.series.values().map(|values| cell(&values[i])));
        table.add_row(row);
    }

    println!("\n  {}", title.cyan().bold());
    println!("{table}");
}

fn run_activity(analysis: &Path, json: bool) -> Result<()> {
    let divider = load_divider(analysis)?;
    let activity = report::activity(&divider);

    if json {
        println!("{}", serde_json::to_string_pretty(&activity)?);
        return Ok(());
    }

    let title = format!("{} activity (messages sent)", divider.period().describe());
    print_series(&title, &activity, |n| n.to_string());
    Ok(())
}

fn run_reacts(analysis: &Path, json: bool) -> Result<()> {
    let divider = load_divider(analysis)?;
    let received = report::react_density(&divider);
    let given = report::reacts_given_density(&divider);

    if json {
        let output: BTreeMap<&str, &PeriodSeries<f64>> =
            BTreeMap::from([("received", &received), ("given", &given)]);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let period = divider.period().describe();
    print_series(
        &format!("{period} react density (reacts / messages)"),
        &received,
        |v| format_ratio(*v),
    );
    print_series(
        &format!("{period} reacts-given density (reacts given / all messages)"),
        &given,
        |v| format_ratio(*v),
    );
    Ok(())
}

fn run_similarity(
    analysis: &Path,
    kind: UsageKind,
    min_count: u64,
    exclude_self: bool,
    json: bool,
) -> Result<()> {
    use colored::Colorize;

    let doc = load_document(analysis)?;
    let similarity =
        chattally_core::usage_similarity(aggregate(&doc), kind, min_count, exclude_self);

    if json {
        println!("{}", serde_json::to_string_pretty(&similarity)?);
        return Ok(());
    }

    println!(
        "\n  {} {}",
        format!("{} use cosine similarity", kind.name()).cyan().bold(),
        format!(
            "({} items with at least {} uses)",
            similarity.items.len(),
            min_count
        )
        .bright_black()
    );

    let mut header = vec![String::new()];
    header.extend(similarity.labels.iter().cloned());
    let mut table = new_table(header);
    for (label, row) in similarity.labels.iter().zip(&similarity.matrix) {
        let mut cells = vec![label.clone()];
        cells.extend(row.iter().map(|v| format_ratio(*v)));
        table.add_row(cells);
    }
    println!("{table}");
    Ok(())
}
