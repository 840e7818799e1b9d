//! Save/load round-trips through real files.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use pivotree::{Checks, Dataset, KMeansTreeIndex, KMeansTreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_dataset(n: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() * 20.0).collect())
        .collect();
    Dataset::from_rows(&rows).unwrap()
}

#[test]
fn file_round_trip_preserves_query_behavior() {
    let dataset = random_dataset(400, 6, 21);
    let mut index = KMeansTreeIndex::new(
        dataset.clone(),
        KMeansTreeParams {
            branching: 8,
            ..KMeansTreeParams::default().with_seed(13)
        },
    )
    .unwrap();
    index.build().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.pvt");
    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        index.save(&mut writer).unwrap();
    }

    let mut loaded = KMeansTreeIndex::new(dataset, KMeansTreeParams::default()).unwrap();
    {
        let mut reader = BufReader::new(File::open(&path).unwrap());
        loaded.load(&mut reader).unwrap();
    }

    assert_eq!(loaded.size(), index.size());
    assert_eq!(loaded.veclen(), index.veclen());
    assert_eq!(loaded.used_memory(), index.used_memory());

    let mut rng = StdRng::seed_from_u64(77);
    for _ in 0..20 {
        let query: Vec<f32> = (0..6).map(|_| rng.random::<f32>() * 20.0).collect();
        for checks in [Checks::Unlimited, Checks::Budget(64), Checks::Budget(400)] {
            let a = index.search(&query, 7, checks).unwrap();
            let b = loaded.search(&query, 7, checks).unwrap();
            assert_eq!(a, b, "results diverge under {:?}", checks);
        }
    }

    let centers_a = index.cluster_centers(12).unwrap();
    let centers_b = loaded.cluster_centers(12).unwrap();
    assert_eq!(centers_a, centers_b);
}

#[test]
fn loaded_index_serializes_to_identical_bytes() {
    let dataset = random_dataset(150, 4, 5);
    let mut index = KMeansTreeIndex::new(
        dataset.clone(),
        KMeansTreeParams {
            branching: 5,
            ..KMeansTreeParams::default().with_seed(31)
        },
    )
    .unwrap();
    index.build().unwrap();

    let mut first = Vec::new();
    index.save(&mut first).unwrap();

    let mut loaded = KMeansTreeIndex::new(dataset, KMeansTreeParams::default()).unwrap();
    loaded.load(&mut std::io::Cursor::new(&first)).unwrap();

    let mut second = Vec::new();
    loaded.save(&mut second).unwrap();
    assert_eq!(first, second);
}
