use data_loader::{PolarityThresholds, RatingIndex};
use std::path::Path;
use std::time::Instant;

fn main() {
    let path = Path::new("data/ml-1m/ratings.dat");

    println!("Loading ratings from {}...\n", path.display());

    let start = Instant::now();
    let index = RatingIndex::load_from_file(path).expect("Failed to load ratings");
    let load_elapsed = start.elapsed();

    let start = Instant::now();
    let user_items = index.user_items();
    let item_raters = index.item_raters(&PolarityThresholds::default());
    let sets_elapsed = start.elapsed();

    let (users, items, ratings) = index.counts();

    println!("\n=== Load Complete ===");
    println!("Load time: {:?}", load_elapsed);
    println!("Member set time: {:?}", sets_elapsed);
    println!("Users: {} ({} sets)", users, user_items.len());
    println!("Items: {} ({} sets)", items, item_raters.len());
    println!("Ratings: {}", ratings);
    println!("\nPerformance: {:.0} ratings/second",
             ratings as f64 / load_elapsed.as_secs_f64());
}
