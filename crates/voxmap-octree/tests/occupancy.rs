use voxmap_octree::{OccupancyTree, insert_point, insert_point_cloud, insert_scan};
use voxmap_types::{Occupancy, Point3, TreeConfig, VoxelKey};

fn p(x: f64, y: f64, z: f64) -> Point3 {
    Point3::new(x, y, z)
}

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn point(&mut self, half: f64) -> Point3 {
        p(
            (self.next_f64() * 2.0 - 1.0) * half,
            (self.next_f64() * 2.0 - 1.0) * half,
            (self.next_f64() * 2.0 - 1.0) * half,
        )
    }
}

#[test]
fn single_hit_scenario() {
    let cfg = TreeConfig {
        prob_hit: 0.7,
        prob_miss: 0.4,
        ..TreeConfig::with_resolution(0.1)
    };
    let mut tree = OccupancyTree::new(cfg).unwrap();
    insert_point(&mut tree, p(1.0, 1.0, 1.0), None).unwrap();
    assert_eq!(tree.classify(p(1.0, 1.0, 1.0)).unwrap(), Occupancy::Occupied);
    assert_eq!(tree.classify(p(5.0, 5.0, 5.0)).unwrap(), Occupancy::Unknown);
}

#[test]
fn ray_scenario() {
    let mut tree = OccupancyTree::with_resolution(0.5).unwrap();
    insert_point(&mut tree, p(1.0, 0.0, 0.0), Some(p(0.0, 0.0, 0.0))).unwrap();
    assert_eq!(tree.classify(p(0.25, 0.0, 0.0)).unwrap(), Occupancy::Free);
    assert_eq!(tree.classify(p(0.75, 0.0, 0.0)).unwrap(), Occupancy::Occupied);
}

#[test]
fn untouched_keys_stay_unknown() {
    let mut tree = OccupancyTree::with_resolution(0.2).unwrap();
    let mut rng = Lcg(7);
    let inserted: Vec<Point3> = (0..200).map(|_| rng.point(20.0)).collect();
    insert_point_cloud(&mut tree, inserted.iter().copied(), None).unwrap();

    let space = *tree.key_space();
    let touched: std::collections::HashSet<VoxelKey> =
        inserted.iter().map(|&q| space.key_of(q).unwrap()).collect();
    for _ in 0..500 {
        let q = rng.point(25.0);
        let key = space.key_of(q).unwrap();
        if !touched.contains(&key) {
            assert_eq!(tree.classify_key(key), Occupancy::Unknown, "{q:?}");
        }
    }
}

#[test]
fn prune_preserves_every_query() {
    let mut tree = OccupancyTree::with_resolution(1.0).unwrap();
    // A solid 8x8x8 block of hits, a free slab next to it, and scattered noise.
    for x in 0..8 {
        for y in 0..8 {
            for z in 0..8 {
                let c = p(f64::from(x) + 0.5, f64::from(y) + 0.5, f64::from(z) + 0.5);
                tree.update_node_at(c, true).unwrap();
                tree.update_node_at(p(c.x - 8.0, c.y, c.z), false).unwrap();
            }
        }
    }
    let mut rng = Lcg(42);
    for _ in 0..300 {
        let q = rng.point(12.0);
        let hit = rng.next_f64() < 0.5;
        tree.update_node_at(q, hit).unwrap();
    }

    let keys: Vec<VoxelKey> = tree
        .leaves()
        .filter(|l| l.level == 0)
        .map(|l| l.key)
        .collect();
    let before: Vec<(Occupancy, f32)> = keys
        .iter()
        .map(|&k| {
            let n = tree.search_key(k).unwrap();
            (n.occupancy(), n.log_odds())
        })
        .collect();
    let nodes = tree.node_count();

    let collapsed = tree.prune();
    assert!(collapsed > 0);
    assert!(tree.node_count() < nodes);

    for (k, (occ, l)) in keys.iter().zip(before) {
        let n = tree.search_key(*k).unwrap();
        assert_eq!(n.occupancy(), occ);
        assert_eq!(n.log_odds(), l);
    }
    assert_eq!(tree.prune(), 0);
}

#[test]
fn classification_follows_clamped_log_odds_sum() {
    let cfg = TreeConfig::with_resolution(0.1);
    let model = voxmap_octree::SensorModel::from_config(&cfg);
    for hits in 0..6 {
        for misses in 0..10 {
            if hits + misses == 0 {
                continue;
            }
            let mut tree = OccupancyTree::new(cfg.clone()).unwrap();
            let mut l = 0.0f32;
            for _ in 0..hits {
                tree.update_node_at(p(0.3, -0.3, 0.3), true).unwrap();
                l = model.apply(l, true);
            }
            for _ in 0..misses {
                tree.update_node_at(p(0.3, -0.3, 0.3), false).unwrap();
                l = model.apply(l, false);
            }
            let expected = if l > 0.0 {
                Occupancy::Occupied
            } else if l < 0.0 {
                Occupancy::Free
            } else {
                Occupancy::Unknown
            };
            assert_eq!(
                tree.classify(p(0.3, -0.3, 0.3)).unwrap(),
                expected,
                "hits={hits} misses={misses}"
            );
        }
    }
}

#[test]
fn quantisation_is_idempotent_over_random_points() {
    let tree = OccupancyTree::with_resolution(0.05).unwrap();
    let space = tree.key_space();
    let mut rng = Lcg(3);
    for _ in 0..2000 {
        let q = rng.point(1000.0);
        let k = space.key_of(q).unwrap();
        assert_eq!(space.key_of(space.coord_of(k)).unwrap(), k);
    }
}

#[test]
fn reroot_keeps_all_values_bit_exact() {
    let mut tree = OccupancyTree::with_resolution(0.1).unwrap();
    let mut rng = Lcg(11);
    let near: Vec<Point3> = (0..50).map(|_| rng.point(0.5)).collect();
    for &q in &near {
        tree.update_node_at(q, true).unwrap();
    }
    let snapshot: Vec<f32> = near
        .iter()
        .map(|&q| tree.search(q).unwrap().unwrap().log_odds())
        .collect();
    let level = tree.root_level();
    tree.update_node_at(p(1500.0, -2000.0, 800.0), true).unwrap();
    assert!(tree.root_level() > level);
    for (q, l) in near.iter().zip(snapshot) {
        assert_eq!(tree.search(*q).unwrap().unwrap().log_odds(), l);
    }
}

#[test]
fn concurrent_readers_agree() {
    let mut tree = OccupancyTree::with_resolution(0.25).unwrap();
    let origin = p(0.0, 0.0, 0.0);
    let mut rng = Lcg(5);
    let points: Vec<Point3> = (0..100).map(|_| rng.point(8.0)).collect();
    insert_scan(&mut tree, &points, origin, None).unwrap();

    let expected: Vec<Occupancy> = points.iter().map(|&q| tree.classify(q).unwrap()).collect();
    let tree = &tree;
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| points.iter().map(|&q| tree.classify(q).unwrap()).collect::<Vec<_>>()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
    assert!(expected.iter().all(|&o| o == Occupancy::Occupied));
}
