//! Preparation example on a synthetic hyperspectral scene.
//!
//! Builds a small labeled cube in memory, extracts patch samples and splits
//! them with spatial overlap disabled, printing the resulting partition.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use hyperprep::{
    extract_samples, filter_samples, train_val_test_split, GroundTruth, SplitName, SplitOptions,
    TrainSizeSpec,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("hyperprep - synthetic scene preparation");
    println!("=======================================\n");

    // Scene parameters
    let (height, width, channels) = (45, 45, 8);
    let neighborhood = 5;
    let seed = 42;

    println!("Configuration:");
    println!("  Scene: {}x{} pixels, {} bands", height, width, channels);
    println!("  Neighborhood: {}x{}", neighborhood, neighborhood);
    println!("  Seed: {}", seed);
    println!();

    // Three spectral classes laid out in horizontal stripes, plus noise.
    let mut rng = StdRng::seed_from_u64(seed);
    let cube = Array3::from_shape_fn((height, width, channels), |(r, _, ch)| {
        let class = r / 15;
        let base = if ch % 3 == class { 0.9 } else { 0.1 };
        base + rng.gen::<f32>() * 0.05
    });
    let ground_truth = GroundTruth::ClassMap(Array2::from_shape_fn((height, width), |(r, _)| {
        1 + (r / 15) as i64
    }));

    let set = extract_samples(&cube, &ground_truth, Some(neighborhood))?;
    println!("Extracted {} patch samples", set.len());

    let set = filter_samples(set, false, 0)?;
    println!("{} samples after filtering\n", set.len());

    let options = SplitOptions {
        train_size: TrainSizeSpec::fraction(0.7),
        val_size: 0.1,
        stratified: false,
        seed,
        spatial_overlap: false,
        neighborhood_size: Some(neighborhood),
    };
    let splits = train_val_test_split(&set, &options)?;

    for name in [SplitName::Train, SplitName::Val, SplitName::Test] {
        let group = splits.group(name);
        println!(
            "  {:5} {:4} samples ({:.1}%)",
            name.as_str(),
            group.len(),
            100.0 * group.len() as f64 / splits.len() as f64
        );
    }

    Ok(())
}
