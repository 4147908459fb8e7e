//! Streaming behavior of the octant loader against in-memory and on-disk
//! point clouds.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use glam::DVec3;
use pcloud_core::codec::RawPointCodec;
use pcloud_core::point::{FieldValue, Point};
use pcloud_core::schema::{FieldKind, PointType};
use pcloud_core::status::{PointCloudError, PointCloudResult};
use pcloud_octree::payload::encode_payload;
use pcloud_octree::{
    Octant, OctantId, OctantIndex, OctreeBuilder, OctreeBuilderOptions, OctreeFileWriter,
    OctreeHierarchy, PayloadSource,
};
use pcloud_streaming::{
    Camera, DebugNode, LoaderConfig, OctantLoader, OctantState, PointSizeMode, ShaderEffect,
    VisibleOctreeHierarchyTexture, OCTREE_TEX_PARAM,
};
use tempfile::TempDir;

/// Payloads held in memory. Reads block until the gate is opened.
struct MemorySource {
    payloads: HashMap<OctantId, Vec<u8>>,
    reads: AtomicUsize,
    open: Mutex<bool>,
    gate: Condvar,
}

impl MemorySource {
    fn new(payloads: HashMap<OctantId, Vec<u8>>, open: bool) -> Self {
        Self {
            payloads,
            reads: AtomicUsize::new(0),
            open: Mutex::new(open),
            gate: Condvar::new(),
        }
    }

    fn open_gate(&self) {
        *self.open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PayloadSource for MemorySource {
    fn read_payload(&self, id: &OctantId) -> PointCloudResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.gate.wait(open).unwrap();
        }
        drop(open);
        self.payloads
            .get(id)
            .cloned()
            .ok_or_else(|| PointCloudError::LoadFailure {
                octant: id.to_string(),
                reason: "no such payload".into(),
            })
    }
}

#[derive(Default)]
struct RecordingEffect {
    params: Vec<(String, usize)>,
}

impl ShaderEffect for RecordingEffect {
    fn set_texture_param(&mut self, name: &str, texture: &VisibleOctreeHierarchyTexture) {
        self.params.push((name.to_string(), texture.len()));
    }
}

fn codec() -> RawPointCodec {
    RawPointCodec::new(Arc::new(PointType::Pos64.schema()))
}

/// Root of edge 16 at the origin holding `root_points`, plus one child per
/// `(position, points)` entry.
fn scene(root_points: u32, children: &[(u8, u32)]) -> (OctreeHierarchy, HashMap<OctantId, Vec<u8>>) {
    let mut hierarchy = OctreeHierarchy::new(Octant::new(OctantId::ROOT, DVec3::ZERO, 16.0));
    let root = hierarchy.root();
    hierarchy.set_point_count(root, root_points);
    for &(pos, count) in children {
        let child = hierarchy.add_child(root, pos).unwrap();
        hierarchy.set_point_count(child, count);
    }

    let codec = codec();
    let mut payloads = HashMap::new();
    for octant in hierarchy.octants() {
        let c = octant.center;
        let points: Vec<Point> = (0..octant.point_count)
            .map(|_| Point::new().with(FieldKind::Position, FieldValue::Float3_64([c.x, c.y, c.z])))
            .collect();
        payloads.insert(octant.id, encode_payload(&codec, &points).unwrap());
    }
    (hierarchy, payloads)
}

fn config() -> LoaderConfig {
    LoaderConfig::new()
        .with_update_interval(Duration::ZERO)
        .with_worker_threads(2)
}

fn front_camera() -> Camera {
    Camera::look_at(DVec3::new(0.0, 0.0, 50.0), DVec3::ZERO, FRAC_PI_3, 800, 600)
}

fn away_camera() -> Camera {
    Camera::look_at(DVec3::new(0.0, 0.0, 50.0), DVec3::new(0.0, 0.0, 100.0), FRAC_PI_3, 800, 600)
}

fn start(
    config: LoaderConfig,
    root_points: u32,
    children: &[(u8, u32)],
    gate_open: bool,
) -> (OctantLoader, Arc<MemorySource>, OctreeHierarchy) {
    let (hierarchy, payloads) = scene(root_points, children);
    let source = Arc::new(MemorySource::new(payloads, gate_open));
    let mut loader = OctantLoader::new(config);
    loader
        .set_root(hierarchy.clone(), codec(), source.clone())
        .unwrap();
    (loader, source, hierarchy)
}

/// Runs updates until `done` holds, calling `each` after every update.
fn pump(
    loader: &mut OctantLoader,
    camera: &mut Camera,
    mut each: impl FnMut(&OctantLoader),
    done: impl Fn(&OctantLoader) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        loader.update_scene(camera, PointSizeMode::FixedPixelSize, &mut []);
        each(loader);
        if done(loader) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn settled(loader: &OctantLoader) -> bool {
    loader.pending_requests() == 0 && loader.resident_count() > 0
}

#[test]
fn test_threshold_admits_only_one_of_two_equal_octants() {
    let (mut loader, _source, _) = start(config().with_point_threshold(1000), 0, &[(0, 800), (1, 800)], true);
    let a = OctantIndex(1);
    let b = OctantIndex(2);
    let mut camera = front_camera();

    let mut max_points = 0;
    let finished = pump(
        &mut loader,
        &mut camera,
        |l| {
            assert!(!(l.is_resident(a) && l.is_resident(b)));
            max_points = max_points.max(l.resident_points());
        },
        |l| l.pending_requests() == 0 && l.resident_count() == 2,
    );
    assert!(finished);
    assert!(max_points <= 1000);
    assert_eq!(loader.resident_points(), 800);
    assert_eq!(loader.number_of_visible_points(), 800);
    assert!(loader.is_resident(OctantIndex(0)));
    assert!(loader.is_resident(a) ^ loader.is_resident(b));

    // Further frames keep the same choice.
    for _ in 0..10 {
        loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
        assert!(!(loader.is_resident(a) && loader.is_resident(b)));
        assert_eq!(loader.pending_requests(), 0);
    }
}

#[test]
fn test_shutdown_drains_in_flight_loads_and_releases_everything() {
    let children: Vec<(u8, u32)> = (0..6).map(|pos| (pos, 10)).collect();
    let (mut loader, source, _) = start(config(), 10, &children, false);
    let mut camera = front_camera();

    loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
    assert_eq!(loader.pending_requests(), 5);
    assert_eq!(loader.stats().requested, 5);

    loader.request_shutdown();
    assert!(loader.is_shutting_down());
    loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
    assert_eq!(loader.pending_requests(), 5);
    assert_eq!(loader.stats().requested, 0);
    assert_eq!(loader.stats().evicting, 5);
    assert!(!loader.is_shut_down());

    source.open_gate();
    let finished = pump(
        &mut loader,
        &mut camera,
        |l| assert_eq!(l.resident_count(), 0),
        |l| l.is_shut_down(),
    );
    assert!(finished);
    assert_eq!(loader.pending_requests(), 0);
    assert_eq!(loader.resident_points(), 0);
    assert!(loader.root().is_none());
    assert!(loader.visible_hierarchy_texture().is_empty());
    assert!(source.reads() <= 5);

    // Nothing happens after shutdown.
    assert!(!loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []));
}

#[test]
fn test_octants_leaving_the_frustum_are_evicted_next_update() {
    let (mut loader, _source, _) = start(config(), 50, &[(0, 50), (7, 50)], true);
    let mut camera = front_camera();
    assert!(pump(&mut loader, &mut camera, |_| {}, |l| settled(l) && l.resident_count() == 3));

    let mut away = away_camera();
    assert!(loader.update_scene(&mut away, PointSizeMode::FixedPixelSize, &mut []));
    assert!(loader.was_updated());
    assert_eq!(loader.resident_count(), 0);
    assert_eq!(loader.resident_points(), 0);
    assert_eq!(loader.number_of_visible_points(), 0);
    assert_eq!(loader.state_of(OctantIndex(0)), OctantState::Unloaded);

    assert!(!loader.update_scene(&mut away, PointSizeMode::FixedPixelSize, &mut []));
    assert!(!loader.was_updated());
}

#[test]
fn test_failed_load_stays_unloaded_until_retry() {
    let (hierarchy, mut payloads) = scene(10, &[(0, 20), (1, 20)]);
    let broken = hierarchy[OctantIndex(2)].id;
    payloads.remove(&broken);
    let source = Arc::new(MemorySource::new(payloads, true));
    let mut loader: OctantLoader = OctantLoader::new(config());
    loader.set_root(hierarchy, codec(), source.clone()).unwrap();
    let mut camera = front_camera();

    assert!(pump(
        &mut loader,
        &mut camera,
        |_| {},
        |l| l.pending_requests() == 0 && l.failed_octants().count() == 1
    ));
    assert_eq!(loader.failed_octants().collect::<Vec<_>>(), vec![OctantIndex(2)]);
    assert_eq!(loader.state_of(OctantIndex(2)), OctantState::Unloaded);
    assert!(!loader.is_resident(OctantIndex(2)));
    assert!(pump(&mut loader, &mut camera, |_| {}, |l| l.resident_count() == 2));
    assert_eq!(loader.resident_points(), 30);

    let reads = source.reads();
    for _ in 0..10 {
        loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
    }
    assert_eq!(source.reads(), reads);

    assert_eq!(loader.retry_failed(), 1);
    assert!(pump(
        &mut loader,
        &mut camera,
        |_| {},
        |l| l.pending_requests() == 0 && l.failed_octants().count() == 1
    ));
    assert!(source.reads() > reads);
}

#[test]
fn test_failed_root_still_streams_its_children() {
    let (hierarchy, mut payloads) = scene(10, &[(0, 20), (6, 20)]);
    payloads.remove(&OctantId::ROOT);
    let source = Arc::new(MemorySource::new(payloads, true));
    let mut loader: OctantLoader = OctantLoader::new(config());
    loader.set_root(hierarchy, codec(), source).unwrap();
    let mut camera = front_camera();

    assert!(pump(
        &mut loader,
        &mut camera,
        |_| {},
        |l| l.pending_requests() == 0 && l.failed_octants().count() == 1 && l.resident_count() == 2
    ));
    assert_eq!(loader.failed_octants().collect::<Vec<_>>(), vec![OctantIndex(0)]);
    assert!(!loader.is_resident(OctantIndex(0)));
    assert!(loader.is_resident(OctantIndex(1)));
    assert!(loader.is_resident(OctantIndex(2)));
    assert_eq!(loader.resident_points(), 40);
    assert_eq!(loader.number_of_visible_points(), 40);
    // No visible root, so the hierarchy texture stays empty.
    assert!(loader.visible_hierarchy_texture().is_empty());
}

#[test]
fn test_load_reclaimed_while_in_flight_is_discarded() {
    let (mut loader, source, _) = start(config(), 10, &[(3, 10)], false);
    let mut camera = front_camera();
    let mut away = away_camera();

    loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []);
    assert_eq!(loader.pending_requests(), 2);
    loader.update_scene(&mut away, PointSizeMode::FixedPixelSize, &mut []);
    assert_eq!(loader.state_of(OctantIndex(0)), OctantState::Evicting);
    assert_eq!(loader.state_of(OctantIndex(1)), OctantState::Evicting);

    source.open_gate();
    assert!(pump(&mut loader, &mut away, |l| assert_eq!(l.resident_count(), 0), |l| {
        l.pending_requests() == 0
    }));
    assert_eq!(loader.state_of(OctantIndex(0)), OctantState::Unloaded);

    assert!(pump(&mut loader, &mut camera, |_| {}, |l| settled(l) && l.resident_count() == 2));
    assert_eq!(loader.state_of(OctantIndex(1)), OctantState::Resident);
}

#[test]
fn test_lowering_threshold_evicts_smallest_octants() {
    let children: Vec<(u8, u32)> = (0..4).map(|pos| (pos, 100)).collect();
    let (mut loader, _source, _) = start(config(), 10, &children, true);
    let mut camera = front_camera();
    assert!(pump(&mut loader, &mut camera, |_| {}, |l| settled(l) && l.resident_count() == 5));
    assert_eq!(loader.resident_points(), 410);

    loader.set_point_threshold(250);
    assert!(loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []));
    assert!(loader.resident_points() <= 250);
    assert!(loader.is_resident(OctantIndex(0)));
    assert_eq!(loader.resident_count(), 3);
    assert_eq!(loader.number_of_visible_points(), 210);
}

#[test]
fn test_adaptive_size_mode_receives_hierarchy_texture() {
    let (mut loader, _source, _) = start(config(), 10, &[(0, 10), (5, 10)], true);
    let mut camera = front_camera();
    assert!(pump(&mut loader, &mut camera, |_| {}, |l| settled(l) && l.resident_count() == 3));
    assert_eq!(camera.uploaded_texels, None);

    let mut effect = RecordingEffect::default();
    loader.update_scene(
        &mut camera,
        PointSizeMode::AdaptiveSize,
        &mut [&mut effect as &mut dyn ShaderEffect],
    );
    assert_eq!(effect.params, vec![(OCTREE_TEX_PARAM.to_string(), 3)]);
    assert_eq!(camera.uploaded_texels, Some(3));

    let texture = loader.visible_hierarchy_texture();
    assert_eq!(texture.texel(0), Some([0b0010_0001, 1, 0, 0]));

    // Unchanged frames do not re-send the texture.
    loader.update_scene(
        &mut camera,
        PointSizeMode::AdaptiveSize,
        &mut [&mut effect as &mut dyn ShaderEffect],
    );
    assert_eq!(effect.params.len(), 1);
}

#[test]
fn test_wireframes_follow_resident_octants() {
    let (mut loader, _source, _) = start(config(), 10, &[(2, 10), (4, 10)], true);
    let mut camera = front_camera();
    assert!(pump(&mut loader, &mut camera, |_| {}, |l| settled(l) && l.resident_count() == 3));

    let mut scene: Vec<DebugNode> = Vec::new();
    assert_eq!(loader.show_octants(&mut scene), 3);
    assert_eq!(loader.show_octants(&mut scene), 3);
    assert_eq!(scene.len(), 3);
    assert_eq!(scene[0].center, DVec3::ZERO);
    assert_eq!(scene[0].size, 16.0);

    assert_eq!(loader.delete_wireframe_octants(&mut scene), 3);
    assert!(scene.is_empty());
}

#[test]
fn test_init_with_broken_folder_leaves_loader_empty() {
    let dir = TempDir::new().unwrap();
    let mut camera = front_camera();
    let mut loader: OctantLoader = OctantLoader::new(config().with_file_folder_path(dir.path()));

    let err = loader.init(&camera).unwrap_err();
    assert!(matches!(err, PointCloudError::StructuralCorruption(_)), "{:?}", err);
    assert!(loader.root().is_none());
    assert!(!loader.update_scene(&mut camera, PointSizeMode::FixedPixelSize, &mut []));
    assert_eq!(loader.resident_count(), 0);
}

#[test]
fn test_streams_written_folder() {
    let points: Vec<Point> = (0..3000u32)
        .map(|i| {
            let x = (i * 7919 % 3000) as f64 / 300.0;
            let y = (i * 104_729 % 1000) as f64 / 100.0;
            let z = (i * 1_299_709 % 700) as f64 / 70.0;
            Point::new().with(FieldKind::Position, FieldValue::Float3_64([x, y, z]))
        })
        .collect();
    let options = OctreeBuilderOptions::new()
        .with_max_points_in_bucket(200)
        .with_grid_resolution(8);
    let tree = OctreeBuilder::new(options).build(points).unwrap();
    let dir = TempDir::new().unwrap();
    OctreeFileWriter::new(dir.path()).write(&tree, &codec()).unwrap();

    let root_center = tree.hierarchy[tree.hierarchy.root()].center;
    let mut camera = Camera::look_at(root_center + DVec3::new(0.0, 0.0, 40.0), root_center, FRAC_PI_3, 800, 600);
    let mut loader: OctantLoader =
        OctantLoader::new(config().with_file_folder_path(dir.path()).with_point_threshold(2000));
    loader.init(&camera).unwrap();
    assert_eq!(loader.hierarchy().map(OctreeHierarchy::len), Some(tree.hierarchy.len()));
    assert!(loader.min_screen_projected_size() > 0.0);

    assert!(pump(&mut loader, &mut camera, |l| assert!(l.resident_points() <= 2000), |l| {
        settled(l) && l.stats().requested == 0 && l.resident_points() == l.number_of_visible_points()
    }));

    let mut total = 0;
    for (octant, cloud) in loader.resident_clouds() {
        assert_eq!(cloud.len(), octant.point_count as usize);
        assert_eq!(cloud.source(), octant.id.to_string());
        total += cloud.len() as u64;
    }
    assert_eq!(total, loader.resident_points());
}
