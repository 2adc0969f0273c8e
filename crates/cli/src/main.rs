use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use data_loader::parser::parse_titles;
use data_loader::{ItemId, ItemTitles, Polarity, PolarityThresholds, RatingIndex, UserId};
use serde::Serialize;
use similarity::recommend::{
    DEFAULT_ITEM_FALSE_POSITIVE_WEIGHT, DEFAULT_ITEM_HASH_FUNCTIONS, DEFAULT_ITEM_MIN_MEMBERS,
};
use similarity::{
    build_index, compare_estimates, jaccard_similarities, lsh_similarities, minhash_similarities,
    recall, EstimationErrors, ItemRecommender, LshConfig, LshEfficiency, MemberSets, MinHashConfig,
    Recommendation, SimilarityTable, DEFAULT_MODULUS,
};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Instant;

/// simlsh - approximate set similarity with MinHash and LSH
#[derive(Parser)]
#[command(name = "simlsh")]
#[command(about = "Find similar users and items with exact Jaccard, MinHash and LSH", long_about = None)]
struct Cli {
    /// Ratings file: `user::item::rating::timestamp` or `user,item,rating[,timestamp]`
    #[arg(short, long, default_value = "data/ml-1m/ratings.dat")]
    ratings: PathBuf,

    /// Item catalog (`item::title[::genres]` or `item,title[,genres]`) used
    /// to print titles next to item IDs
    #[arg(long, global = true)]
    items: Option<PathBuf>,

    /// Seed for the hash functions (OS-seeded when omitted)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print a JSON report instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exact Jaccard similarity of every user pair
    Jaccard {
        /// Minimum similarity of a reported pair
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Number of pairs to print
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// MinHash-estimated similarity of every user pair
    Minhash {
        /// Number of hash functions per signature
        #[arg(long, default_value = "100")]
        hash_functions: usize,

        /// Prime modulus of the hash family
        #[arg(long, default_value_t = DEFAULT_MODULUS)]
        modulus: u64,

        #[arg(long, default_value = "0.5")]
        threshold: f64,

        #[arg(long, default_value = "20")]
        top: usize,

        /// Also run the exact baseline and report estimation errors
        #[arg(long)]
        compare: bool,
    },

    /// Similar user pairs via banded LSH
    Lsh {
        #[command(flatten)]
        lsh: LshArgs,

        #[arg(long, default_value = "0.5")]
        threshold: f64,

        #[arg(long, default_value = "20")]
        top: usize,

        /// Also run the exact baseline and report recall
        #[arg(long)]
        compare: bool,
    },

    /// Items most similar to one item
    Neighbors {
        /// Item to look up
        #[arg(long)]
        item_id: ItemId,

        #[command(flatten)]
        lsh: LshArgs,

        #[command(flatten)]
        polarity: PolarityArgs,

        /// Minimum similarity of a neighbor
        #[arg(long, default_value = "0.2")]
        threshold: f64,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Item-based recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        #[command(flatten)]
        lsh: LshArgs,

        #[command(flatten)]
        polarity: PolarityArgs,

        /// Minimum similarity of a neighbor
        #[arg(long, default_value = "0.2")]
        neighbor_threshold: f64,

        /// Number of recommendations to return
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

/// Band split and hash family of an LSH run
#[derive(Args)]
struct LshArgs {
    /// Number of bands (derived from --hash-functions when omitted)
    #[arg(long)]
    bands: Option<usize>,

    /// Rows per band (derived from --hash-functions when omitted)
    #[arg(long)]
    rows: Option<usize>,

    /// Signature budget (100 for `lsh`, 1000 for item commands)
    #[arg(long)]
    hash_functions: Option<usize>,

    /// Weight of false positives when choosing the band split; false
    /// negatives weigh the rest. Without it the split whose S-curve midpoint
    /// is closest to the threshold is used (item commands default to 0.2)
    #[arg(long)]
    false_positive_weight: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_MODULUS)]
    modulus: u64,

    /// Entities with fewer members are not indexed
    #[arg(long)]
    min_members: Option<usize>,
}

/// Band split used when neither --bands nor --rows is given
#[derive(Clone, Copy)]
struct SplitDefaults {
    hash_functions: usize,
    false_positive_weight: Option<f64>,
    min_members: usize,
}

impl SplitDefaults {
    const USERS: Self = Self {
        hash_functions: 100,
        false_positive_weight: None,
        min_members: 0,
    };

    const ITEMS: Self = Self {
        hash_functions: DEFAULT_ITEM_HASH_FUNCTIONS,
        false_positive_weight: Some(DEFAULT_ITEM_FALSE_POSITIVE_WEIGHT),
        min_members: DEFAULT_ITEM_MIN_MEMBERS,
    };
}

impl LshArgs {
    fn config(&self, threshold: f64, defaults: SplitDefaults, seed: Option<u64>) -> Result<LshConfig> {
        let n = self.hash_functions.unwrap_or(defaults.hash_functions);
        let config = match (self.bands, self.rows) {
            (Some(bands), Some(rows)) => LshConfig::new(bands, rows),
            (None, None) => match self.false_positive_weight.or(defaults.false_positive_weight) {
                Some(fp_weight) => {
                    ensure!(
                        (0.0..=1.0).contains(&fp_weight),
                        "--false-positive-weight must be within [0, 1], got {}",
                        fp_weight
                    );
                    LshConfig::for_threshold_weighted(n, threshold, fp_weight, 1.0 - fp_weight)?
                }
                None => LshConfig::for_threshold(n, threshold)?,
            },
            (Some(bands), None) => {
                ensure!(bands > 0 && n % bands == 0, "{} bands do not divide {} hash functions", bands, n);
                LshConfig::new(bands, n / bands)
            }
            (None, Some(rows)) => {
                ensure!(rows > 0 && n % rows == 0, "{} rows do not divide {} hash functions", rows, n);
                LshConfig::new(n / rows, rows)
            }
        };

        let mut config = config
            .with_modulus(self.modulus)
            .with_similarity_threshold(threshold)
            .with_min_members(self.min_members.unwrap_or(defaults.min_members));
        if let Some(seed) = seed {
            config = config.with_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Rating cut-offs for item rater tokens
#[derive(Args)]
struct PolarityArgs {
    /// Ratings below this are negative
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    negative_below: f32,

    /// Ratings above this are positive
    #[arg(long, default_value = "5.0", allow_negative_numbers = true)]
    positive_above: f32,
}

impl PolarityArgs {
    fn thresholds(&self) -> Result<PolarityThresholds> {
        ensure!(
            self.negative_below <= self.positive_above,
            "--negative-below ({}) must not exceed --positive-above ({})",
            self.negative_below,
            self.positive_above
        );
        Ok(PolarityThresholds::new(self.negative_below, self.positive_above))
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !cli.json {
        println!("Loading ratings from {}...", cli.ratings.display());
    }
    let start = Instant::now();
    let index = RatingIndex::load_from_file(&cli.ratings).context("Failed to load ratings")?;
    if !cli.json {
        let (users, items, ratings) = index.counts();
        println!(
            "{} Loaded {} ratings ({} users, {} items) in {:?}",
            "✓".green(),
            ratings,
            users,
            items,
            start.elapsed()
        );
    }

    let titles = match &cli.items {
        Some(path) => {
            let titles = parse_titles(path).context("Failed to load item titles")?;
            if !cli.json {
                println!("{} Loaded {} item titles", "✓".green(), titles.len());
            }
            titles
        }
        None => ItemTitles::new(),
    };

    let out = Output { json: cli.json };
    match cli.command {
        Commands::Jaccard { threshold, top } => {
            handle_jaccard(&index, &titles, threshold, top, out)?
        }
        Commands::Minhash {
            hash_functions,
            modulus,
            threshold,
            top,
            compare,
        } => {
            let mut config = MinHashConfig::new(hash_functions)
                .with_modulus(modulus)
                .with_similarity_threshold(threshold);
            if let Some(seed) = cli.seed {
                config = config.with_seed(seed);
            }
            handle_minhash(&index, &titles, &config, top, compare, out)?
        }
        Commands::Lsh {
            lsh,
            threshold,
            top,
            compare,
        } => {
            let config = lsh.config(threshold, SplitDefaults::USERS, cli.seed)?;
            handle_lsh(&index, &titles, &config, top, compare, out)?
        }
        Commands::Neighbors {
            item_id,
            lsh,
            polarity,
            threshold,
            limit,
        } => {
            let config = lsh.config(threshold, SplitDefaults::ITEMS, cli.seed)?;
            let thresholds = polarity.thresholds()?;
            handle_neighbors(&index, &titles, item_id, &config, &thresholds, limit, out)?
        }
        Commands::Recommend {
            user_id,
            lsh,
            polarity,
            neighbor_threshold,
            limit,
        } => {
            let config = lsh.config(neighbor_threshold, SplitDefaults::ITEMS, cli.seed)?;
            let thresholds = polarity.thresholds()?;
            handle_recommend(&index, &titles, user_id, &config, &thresholds, limit, out)?
        }
    }

    Ok(())
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize>(&self, report: &T) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct PairsReport<'a> {
    method: &'a str,
    similarity_threshold: f64,
    similar_pairs: &'a SimilarityTable<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimation_errors: Option<EstimationErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    efficiency: Option<LshEfficiency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a LshConfig>,
}

/// Handle the 'jaccard' command
fn handle_jaccard(
    index: &RatingIndex,
    titles: &ItemTitles,
    threshold: f64,
    top: usize,
    out: Output,
) -> Result<()> {
    let sets = index.user_items();

    let start = Instant::now();
    let report = jaccard_similarities(&sets, threshold).context("Exact Jaccard failed")?;
    let elapsed = start.elapsed();

    if out.json {
        return out.print_json(&PairsReport {
            method: "jaccard",
            similarity_threshold: threshold,
            similar_pairs: &report.similar,
            estimation_errors: None,
            recall: None,
            efficiency: None,
            config: None,
        });
    }

    println!("Scored {} pairs in {:?}", report.all.len(), elapsed);
    print_pairs("Exact Jaccard", &report.similar, threshold, top);
    print_most_similar(&sets, &report.similar, titles);
    Ok(())
}

/// Handle the 'minhash' command
fn handle_minhash(
    index: &RatingIndex,
    titles: &ItemTitles,
    config: &MinHashConfig,
    top: usize,
    compare: bool,
    out: Output,
) -> Result<()> {
    let sets = index.user_items();

    let start = Instant::now();
    let report = minhash_similarities(&sets, config).context("MinHash estimation failed")?;
    let elapsed = start.elapsed();

    let (errors, recall_rate) = if compare {
        let exact = jaccard_similarities(&sets, config.similarity_threshold)
            .context("Exact Jaccard failed")?;
        (
            Some(compare_estimates(&exact.all, &report.all)?),
            Some(recall(&report.similar, &exact.similar)),
        )
    } else {
        (None, None)
    };

    if out.json {
        return out.print_json(&PairsReport {
            method: "minhash",
            similarity_threshold: config.similarity_threshold,
            similar_pairs: &report.similar,
            estimation_errors: errors,
            recall: recall_rate,
            efficiency: None,
            config: None,
        });
    }

    println!(
        "Estimated {} pairs with {} hash functions in {:?}",
        report.all.len(),
        config.num_hash_functions,
        elapsed
    );
    print_pairs("MinHash", &report.similar, config.similarity_threshold, top);
    print_most_similar(&sets, &report.similar, titles);
    if let Some(errors) = errors {
        print_estimation_errors(&errors);
    }
    if let Some(recall_rate) = recall_rate {
        println!("{}Recall vs exact: {:.3}", "• ".cyan(), recall_rate);
    }
    Ok(())
}

/// Handle the 'lsh' command
fn handle_lsh(
    index: &RatingIndex,
    titles: &ItemTitles,
    config: &LshConfig,
    top: usize,
    compare: bool,
    out: Output,
) -> Result<()> {
    let sets = index.user_items();

    let start = Instant::now();
    let outcome = lsh_similarities(&sets, config).context("LSH similarity search failed")?;
    let elapsed = start.elapsed();
    let efficiency = LshEfficiency::from_outcome(&outcome);

    let recall_rate = if compare {
        let exact = jaccard_similarities(&sets, config.similarity_threshold)
            .context("Exact Jaccard failed")?;
        Some(recall(&outcome.similar, &exact.similar))
    } else {
        None
    };

    if out.json {
        return out.print_json(&PairsReport {
            method: "lsh",
            similarity_threshold: config.similarity_threshold,
            similar_pairs: &outcome.similar,
            estimation_errors: None,
            recall: recall_rate,
            efficiency: Some(efficiency),
            config: Some(config),
        });
    }

    println!(
        "{} bands x {} rows, {} of {} users indexed, searched in {:?}",
        config.num_bands,
        config.rows_per_band,
        outcome.indexed_entities,
        sets.len(),
        elapsed
    );
    print_pairs("LSH", &outcome.similar, config.similarity_threshold, top);
    print_most_similar(&sets, &outcome.similar, titles);

    println!("{}", "Efficiency:".bold().blue());
    println!("{}True pairs: {}", "• ".cyan(), efficiency.true_pairs);
    println!(
        "{}Similarity evaluations: {}",
        "• ".cyan(),
        efficiency.similarity_evaluations
    );
    println!(
        "{}Possible pairs: {} ({} comparisons avoided, ratio {:.4})",
        "• ".cyan(),
        efficiency.total_pairs,
        efficiency.comparisons_avoided(),
        efficiency.evaluation_ratio()
    );
    if let Some(precision) = efficiency.precision() {
        println!("{}Precision: {:.3}", "• ".cyan(), precision);
    }
    if let Some(recall_rate) = recall_rate {
        println!("{}Recall vs exact: {:.3}", "• ".cyan(), recall_rate);
    }
    Ok(())
}

/// Handle the 'neighbors' command
fn handle_neighbors(
    index: &RatingIndex,
    titles: &ItemTitles,
    item_id: ItemId,
    config: &LshConfig,
    thresholds: &PolarityThresholds,
    limit: usize,
    out: Output,
) -> Result<()> {
    let item_sets = index.item_raters(thresholds);
    let item_index = build_index(&item_sets, config).context("Failed to build item index")?;

    let mut neighbors = item_index
        .neighbors(&item_id, &item_sets, config.similarity_threshold)
        .with_context(|| format!("No neighbors for item {}", item_id))?;
    neighbors.truncate(limit);

    if out.json {
        #[derive(Serialize)]
        struct Neighbor<'a> {
            item: ItemId,
            #[serde(skip_serializing_if = "Option::is_none")]
            title: Option<&'a str>,
            similarity: f64,
        }
        let neighbors: Vec<Neighbor> = neighbors
            .into_iter()
            .map(|(item, similarity)| Neighbor {
                item,
                title: titles.get(&item).map(String::as_str),
                similarity,
            })
            .collect();
        return out.print_json(&neighbors);
    }

    println!(
        "{}",
        format!(
            "Items similar to {} (>= {}):",
            item_label(item_id, titles),
            config.similarity_threshold
        )
            .bold()
            .blue()
    );
    if neighbors.is_empty() {
        println!("  (none)");
    }
    for (rank, (item, similarity)) in neighbors.iter().enumerate() {
        println!(
            "{}. {} - {:.4}",
            (rank + 1).to_string().green(),
            item_label(*item, titles),
            similarity
        );
    }
    Ok(())
}

/// Handle the 'recommend' command
fn handle_recommend(
    index: &RatingIndex,
    titles: &ItemTitles,
    user_id: UserId,
    config: &LshConfig,
    thresholds: &PolarityThresholds,
    limit: usize,
    out: Output,
) -> Result<()> {
    if !index.contains_user(user_id) {
        bail!("User {} not found", user_id);
    }

    let polarities = index.user_polarities(user_id, thresholds);
    let liked: Vec<ItemId> = polarities
        .iter()
        .filter(|(_, polarity)| *polarity == Polarity::Positive)
        .map(|&(item, _)| item)
        .collect();
    let rated: HashSet<ItemId> = polarities.iter().map(|&(item, _)| item).collect();

    let item_sets = index.item_raters(thresholds);
    let item_index = build_index(&item_sets, config).context("Failed to build item index")?;
    let recommendations = ItemRecommender::new(&item_index, &item_sets)
        .with_neighbor_threshold(config.similarity_threshold)
        .with_limit(limit)
        .recommend(&liked, &rated)
        .context("Failed to compute recommendations")?;

    if out.json {
        #[derive(Serialize)]
        struct Titled<'a> {
            #[serde(flatten)]
            recommendation: &'a Recommendation<ItemId>,
            #[serde(skip_serializing_if = "Option::is_none")]
            title: Option<&'a str>,
        }
        let titled: Vec<Titled> = recommendations
            .iter()
            .map(|recommendation| Titled {
                recommendation,
                title: titles.get(&recommendation.item).map(String::as_str),
            })
            .collect();
        return out.print_json(&titled);
    }

    println!(
        "User {} rated {} items, {} positively",
        user_id,
        rated.len(),
        liked.len()
    );
    print_recommendations(&recommendations, titles);
    Ok(())
}

fn print_pairs(method: &str, similar: &SimilarityTable<UserId>, threshold: f64, top: usize) {
    println!(
        "{}",
        format!("{}: {} pairs with similarity >= {}", method, similar.len(), threshold)
            .bold()
            .blue()
    );
    for (rank, pair) in similar.iter().take(top).enumerate() {
        println!(
            "{}. {} - {:.4}",
            (rank + 1).to_string().green(),
            pair.key,
            pair.similarity
        );
    }
    if similar.len() > top {
        println!("  ... {} more", similar.len() - top);
    }
}

/// `item 1193 (One Flew Over the Cuckoo's Nest (1975))`, or just
/// `item 1193` when the catalog has no title for it
fn item_label(item: ItemId, titles: &ItemTitles) -> String {
    match titles.get(&item) {
        Some(title) => format!("item {} ({})", item, title),
        None => format!("item {}", item),
    }
}

/// Print the top pair together with every item either user rated
fn print_most_similar(
    sets: &MemberSets<UserId>,
    similar: &SimilarityTable<UserId>,
    titles: &ItemTitles,
) {
    let Some(top) = similar.top() else {
        return;
    };

    let items: BTreeSet<u64> = [&top.key.first, &top.key.second]
        .into_iter()
        .filter_map(|user| sets.get(user))
        .flatten()
        .copied()
        .collect();

    println!(
        "{}Most similar users: {} ({:.4})",
        "• ".cyan(),
        top.key,
        top.similarity
    );
    if titles.is_empty() {
        let items = items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}Items rated by either: [{}]", "• ".cyan(), items);
        return;
    }

    println!("{}Items rated by either:", "• ".cyan());
    for item in items {
        match ItemId::try_from(item) {
            Ok(item) => println!("    {}", item_label(item, titles)),
            Err(_) => println!("    item {}", item),
        }
    }
}

fn print_estimation_errors(errors: &EstimationErrors) {
    println!("{}", "Estimation vs exact:".bold().blue());
    println!("{}Overestimated (false positives): {}", "• ".cyan(), errors.false_positives);
    println!("{}Underestimated (false negatives): {}", "• ".cyan(), errors.false_negatives);
    println!("{}Exact matches: {}", "• ".cyan(), errors.exact_matches);
    println!(
        "{}Mean absolute error: {:.4} over {} pairs",
        "• ".cyan(),
        errors.mean_absolute_error,
        errors.compared
    );
}

fn print_recommendations(recommendations: &[Recommendation<ItemId>], titles: &ItemTitles) {
    print!("{}", "Item Recommendations:\n".bold().blue());
    if recommendations.is_empty() {
        println!("  (none)");
    }
    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. {} - Score: {:.3} ({} votes)",
            (rank + 1).to_string().green(),
            item_label(rec.item, titles),
            rec.score,
            rec.votes
        );
    }
}
