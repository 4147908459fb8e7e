//! Camera-driven octant streaming.
//!
//! Each update the loader drains finished loads, walks the hierarchy from the
//! root in order of decreasing projected size, drops octants that left the
//! view, and queues loads for the largest visible octants that are missing.
//! Resident points stay under the configured threshold: traversal never
//! selects more points than the threshold allows, and if residents exceed it
//! anyway (for example after lowering the threshold) the octants with the
//! smallest projected size are evicted first.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::{DMat4, DVec3};
use log::{debug, error, info, warn};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::container::PointCloud;
use pcloud_core::point::{Point, PointFields};
use pcloud_core::status::{configuration_error, corruption_error, PointCloudResult};
use pcloud_octree::{Octant, OctantIndex, OctreeFileReader, OctreeHierarchy, PayloadSource};

use crate::config::LoaderConfig;
use crate::frustum::Frustum;
use crate::lifecycle::{Completion, OctantSlot, OctantState};
use crate::priority::Candidate;
use crate::render_context::{
    DebugNode, DebugScene, PointSizeMode, RenderContext, ShaderEffect, OCTREE_TEX_PARAM,
    WIREFRAME_NODE_NAME,
};
use crate::texture::VisibleOctreeHierarchyTexture;
use crate::worker::{LoadCompletion, LoadOutcome, LoadRequest, WorkerPool};

/// Octant counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub resident: usize,
    pub requested: usize,
    pub evicting: usize,
    pub failed: usize,
    pub resident_points: u64,
    pub visible_points: u64,
}

impl fmt::Display for LoaderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resident ({} points), {} requested, {} evicting, {} failed, {} points selected",
            self.resident,
            self.resident_points,
            self.requested,
            self.evicting,
            self.failed,
            self.visible_points
        )
    }
}

struct CameraState {
    position: DVec3,
    frustum: Frustum,
    viewport_height: u32,
    fov_y: f64,
}

impl CameraState {
    /// `None` while the renderer has not set up a camera yet.
    fn from_context(ctx: &dyn RenderContext) -> Option<Self> {
        let view = ctx.view();
        let projection = ctx.projection();
        if view == DMat4::IDENTITY || projection == DMat4::IDENTITY || ctx.viewport_height() == 0 {
            return None;
        }
        Some(Self {
            position: view.inverse().w_axis.truncate(),
            frustum: Frustum::from_view_projection(projection * view),
            viewport_height: ctx.viewport_height(),
            fov_y: ctx.fov_y(),
        })
    }

    fn projected_size(&self, octant: &Octant) -> f64 {
        octant.projected_size(self.position, self.viewport_height, self.fov_y)
    }
}

/// Picks the octants to keep resident, largest projected size first.
///
/// Culled octants and octants below `cutoff` are skipped along with their
/// subtrees. Failed octants are left out of the selection but their children
/// are still considered. An octant that would push the total over `threshold`
/// is skipped too, while smaller ones may still fit.
fn select_octants(
    hierarchy: &OctreeHierarchy,
    camera: &CameraState,
    cutoff: f64,
    threshold: u64,
    failed: &HashSet<OctantIndex>,
) -> (Vec<Candidate>, u64) {
    let candidate = |index: OctantIndex| -> Option<Candidate> {
        let octant = &hierarchy[index];
        if !camera.frustum.intersects_aabb(&octant.bounds()) {
            return None;
        }
        let projected_size = camera.projected_size(octant);
        (projected_size >= cutoff).then_some(Candidate {
            index,
            projected_size,
        })
    };

    let mut heap: BinaryHeap<Candidate> = candidate(hierarchy.root()).into_iter().collect();
    let mut selection = Vec::new();
    let mut points = 0u64;
    while let Some(next) = heap.pop() {
        if !failed.contains(&next.index) {
            let count = u64::from(hierarchy[next.index].point_count);
            if points + count > threshold {
                continue;
            }
            points += count;
            selection.push(next);
        }
        heap.extend(
            hierarchy
                .children(next.index)
                .filter_map(|(_, child)| candidate(child)),
        );
    }
    (selection, points)
}

/// Streams octant payloads of one point cloud in and out of memory.
pub struct OctantLoader<P = Point> {
    config: LoaderConfig,
    hierarchy: Option<OctreeHierarchy>,
    codec: Option<Arc<RawPointCodec>>,
    workers: Option<WorkerPool<P>>,
    slots: Vec<OctantSlot>,
    resident: HashMap<OctantIndex, Arc<PointCloud<P>>>,
    resident_points: u64,
    /// Octants in `Requested` or `Evicting` state.
    pending: HashSet<OctantIndex>,
    /// Requests sent to the workers and not answered yet.
    in_flight: usize,
    failed: HashSet<OctantIndex>,
    /// Octants chosen by the last traversal, in priority order.
    selection: Vec<Candidate>,
    priorities: HashMap<OctantIndex, f64>,
    visible_points: u64,
    min_screen_projected_size: f64,
    texture: VisibleOctreeHierarchyTexture,
    last_traversal: Option<Instant>,
    last_mode: Option<PointSizeMode>,
    was_updated: bool,
    shutting_down: bool,
    shut_down: bool,
}

impl<P: PointFields> OctantLoader<P> {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            hierarchy: None,
            codec: None,
            workers: None,
            slots: Vec::new(),
            resident: HashMap::new(),
            resident_points: 0,
            pending: HashSet::new(),
            in_flight: 0,
            failed: HashSet::new(),
            selection: Vec::new(),
            priorities: HashMap::new(),
            visible_points: 0,
            min_screen_projected_size: 0.0,
            texture: VisibleOctreeHierarchyTexture::default(),
            last_traversal: None,
            last_mode: None,
            was_updated: false,
            shutting_down: false,
            shut_down: false,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn point_threshold(&self) -> u64 {
        self.config.point_threshold
    }

    /// Takes effect on the next update.
    pub fn set_point_threshold(&mut self, threshold: u64) {
        self.config.point_threshold = threshold;
    }

    pub fn min_proj_size_modifier(&self) -> f64 {
        self.config.min_proj_size_modifier
    }

    pub fn set_min_proj_size_modifier(&mut self, modifier: f64) -> PointCloudResult<()> {
        let config = self.config.clone().with_min_proj_size_modifier(modifier);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn file_folder_path(&self) -> Option<&Path> {
        self.config.file_folder_path.as_deref()
    }

    /// Folder opened by the next [`init`](Self::init) or
    /// [`open_folder`](Self::open_folder).
    pub fn set_file_folder_path(&mut self, path: impl Into<PathBuf>) {
        self.config.file_folder_path = Some(path.into());
    }

    /// Validates the configuration, opens the configured folder if no root is
    /// set yet and computes the initial projected size cutoff.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the error of opening the folder.
    /// The loader then has no root and every update is a no-op.
    pub fn init(&mut self, ctx: &dyn RenderContext) -> PointCloudResult<()> {
        self.config.validate()?;
        if self.hierarchy.is_none() && self.config.file_folder_path.is_some() {
            self.open_folder()?;
        }
        if let (Some(hierarchy), Some(camera)) = (&self.hierarchy, CameraState::from_context(ctx))
        {
            let root = &hierarchy[hierarchy.root()];
            self.min_screen_projected_size =
                camera.projected_size(root) * self.config.min_proj_size_modifier;
        }
        Ok(())
    }

    /// Opens the configured point cloud folder and makes it the root.
    pub fn open_folder(&mut self) -> PointCloudResult<()> {
        let folder = self
            .config
            .file_folder_path
            .clone()
            .ok_or_else(|| configuration_error("No point cloud folder configured"))?;
        let mut reader = OctreeFileReader::new(&folder);
        let hierarchy = match reader.get_scene() {
            Ok(hierarchy) => hierarchy,
            Err(e) => {
                error!("Cannot open point cloud {}: {}", folder.display(), e);
                return Err(e);
            }
        };
        let codec = reader
            .codec()
            .ok_or_else(|| corruption_error("Point cloud has no schema"))?;
        self.set_root(hierarchy, codec, Arc::new(reader.payload_source()))
    }

    /// Replaces the streamed hierarchy. All resident payloads, pending loads
    /// and failure marks of the previous root are dropped.
    pub fn set_root(
        &mut self,
        hierarchy: OctreeHierarchy,
        codec: RawPointCodec,
        source: Arc<dyn PayloadSource>,
    ) -> PointCloudResult<()> {
        if hierarchy.is_empty() {
            return Err(corruption_error("Hierarchy has no root octant"));
        }
        self.release();
        self.config.validate()?;

        let codec = Arc::new(codec);
        let capacity = self.config.max_requests_per_update.max(self.config.worker_threads) * 2;
        let workers = WorkerPool::spawn(
            self.config.worker_threads,
            capacity,
            Arc::clone(&codec),
            source,
        )?;
        info!(
            "Streaming {} octants ({} points) with {} workers, threshold {} points",
            hierarchy.len(),
            hierarchy.total_points(),
            self.config.worker_threads,
            self.config.point_threshold
        );

        self.slots = vec![OctantSlot::default(); hierarchy.len()];
        self.hierarchy = Some(hierarchy);
        self.codec = Some(codec);
        self.workers = Some(workers);
        self.shutting_down = false;
        self.shut_down = false;
        Ok(())
    }

    /// Advances streaming by one frame.
    ///
    /// Returns true if the set of resident octants changed, in which case the
    /// visible hierarchy texture was rebuilt.
    pub fn update_scene(
        &mut self,
        ctx: &mut dyn RenderContext,
        mode: PointSizeMode,
        effects: &mut [&mut dyn ShaderEffect],
    ) -> bool {
        let mut changed = self.drain_completions();

        if self.shutting_down {
            changed |= self.finish_shutdown();
        } else if self.hierarchy.is_some() {
            changed |= self.enforce_budget();
            if self.traversal_due() {
                match CameraState::from_context(&*ctx) {
                    Some(camera) => changed |= self.traverse(&camera),
                    None => debug!("No camera set up, skipping traversal"),
                }
            }
            self.issue_requests();
        }

        if changed {
            self.rebuild_texture();
        }
        let mode_changed = self.last_mode != Some(mode);
        self.last_mode = Some(mode);
        if mode == PointSizeMode::AdaptiveSize && (changed || mode_changed) {
            ctx.upload_hierarchy_texture(&self.texture);
            for effect in effects.iter_mut() {
                effect.set_texture_param(OCTREE_TEX_PARAM, &self.texture);
            }
        }

        self.was_updated = changed;
        changed
    }

    /// Whether the last update changed the resident set.
    pub fn was_updated(&self) -> bool {
        self.was_updated
    }

    pub fn hierarchy(&self) -> Option<&OctreeHierarchy> {
        self.hierarchy.as_ref()
    }

    pub fn root(&self) -> Option<&Octant> {
        self.hierarchy.as_ref().map(|h| &h[h.root()])
    }

    pub fn codec(&self) -> Option<&Arc<RawPointCodec>> {
        self.codec.as_ref()
    }

    pub fn state_of(&self, index: OctantIndex) -> OctantState {
        self.slots
            .get(usize::from(index))
            .map(OctantSlot::state)
            .unwrap_or_default()
    }

    pub fn is_resident(&self, index: OctantIndex) -> bool {
        self.resident.contains_key(&index)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    pub fn resident_points(&self) -> u64 {
        self.resident_points
    }

    /// Points of the octants chosen by the last traversal.
    pub fn number_of_visible_points(&self) -> u64 {
        self.visible_points
    }

    /// Loads sent to the workers and not answered yet.
    pub fn pending_requests(&self) -> usize {
        self.in_flight
    }

    /// Projected size below which the last traversal stopped descending.
    pub fn min_screen_projected_size(&self) -> f64 {
        self.min_screen_projected_size
    }

    /// Resident octants with their points, in hierarchy order.
    pub fn resident_clouds(&self) -> Vec<(&Octant, &Arc<PointCloud<P>>)> {
        let Some(hierarchy) = &self.hierarchy else {
            return Vec::new();
        };
        let mut clouds: Vec<_> = self.resident.iter().collect();
        clouds.sort_by_key(|(index, _)| **index);
        clouds
            .into_iter()
            .map(|(index, cloud)| (&hierarchy[*index], cloud))
            .collect()
    }

    pub fn visible_hierarchy_texture(&self) -> &VisibleOctreeHierarchyTexture {
        &self.texture
    }

    pub fn failed_octants(&self) -> impl Iterator<Item = OctantIndex> + '_ {
        self.failed.iter().copied()
    }

    /// Allows octants whose load failed to be requested again. Returns how
    /// many were cleared.
    pub fn retry_failed(&mut self) -> usize {
        let count = self.failed.len();
        self.failed.clear();
        if count > 0 {
            // Traverse on the next update so the octants are selected again.
            self.last_traversal = None;
        }
        count
    }

    pub fn stats(&self) -> LoaderStats {
        let mut stats = LoaderStats {
            resident: self.resident.len(),
            failed: self.failed.len(),
            resident_points: self.resident_points,
            visible_points: self.visible_points,
            ..LoaderStats::default()
        };
        for index in &self.pending {
            match self.state_of(*index) {
                OctantState::Requested => stats.requested += 1,
                OctantState::Evicting => stats.evicting += 1,
                _ => {}
            }
        }
        stats
    }

    /// Replaces the wireframe cubes in `scene` with one per resident octant.
    pub fn show_octants(&self, scene: &mut dyn DebugScene) -> usize {
        self.delete_wireframe_octants(scene);
        let clouds = self.resident_clouds();
        for (octant, _) in &clouds {
            scene.add_node(DebugNode {
                name: WIREFRAME_NODE_NAME.to_string(),
                center: octant.center,
                size: octant.size,
            });
        }
        clouds.len()
    }

    pub fn delete_wireframe_octants(&self, scene: &mut dyn DebugScene) -> usize {
        scene.remove_nodes_named(WIREFRAME_NODE_NAME)
    }

    /// Stops issuing loads. In-flight loads are drained by later updates,
    /// after which all payloads are released and the workers joined.
    pub fn request_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!(
            "Shutting down octant loader, {} loads in flight",
            self.in_flight
        );
        self.shutting_down = true;
        if let Some(workers) = &self.workers {
            workers.signal_shutdown();
        }
        for index in &self.pending {
            if let Some(slot) = self.slots.get_mut(usize::from(*index)) {
                slot.evict();
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// True once a shutdown has released every resource.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn traversal_due(&mut self) -> bool {
        let now = Instant::now();
        match self.last_traversal {
            Some(last) if now.duration_since(last) < self.config.update_interval => false,
            _ => {
                self.last_traversal = Some(now);
                true
            }
        }
    }

    fn traverse(&mut self, camera: &CameraState) -> bool {
        let Some(hierarchy) = &self.hierarchy else {
            return false;
        };
        let root = &hierarchy[hierarchy.root()];
        let cutoff = camera.projected_size(root) * self.config.min_proj_size_modifier;
        let (selection, visible_points) = select_octants(
            hierarchy,
            camera,
            cutoff,
            self.config.point_threshold,
            &self.failed,
        );
        debug!(
            "Selected {} octants with {} points, cutoff {:.2} px",
            selection.len(),
            visible_points,
            cutoff
        );

        self.min_screen_projected_size = cutoff;
        self.visible_points = visible_points;
        self.priorities = selection
            .iter()
            .map(|c| (c.index, c.projected_size))
            .collect();
        self.selection = selection;
        self.evict_unselected()
    }

    /// Drops residents the last traversal did not select and marks such
    /// in-flight loads for discarding.
    fn evict_unselected(&mut self) -> bool {
        let stale: Vec<OctantIndex> = self
            .resident
            .keys()
            .filter(|index| !self.priorities.contains_key(index))
            .copied()
            .collect();
        for index in &stale {
            self.evict(*index);
        }
        for index in &self.pending {
            if !self.priorities.contains_key(index) {
                self.slots[usize::from(*index)].evict();
            }
        }
        !stale.is_empty()
    }

    fn evict(&mut self, index: OctantIndex) {
        self.slots[usize::from(index)].evict();
        if let Some(cloud) = self.resident.remove(&index) {
            self.resident_points -= cloud.len() as u64;
            debug!("Evicted octant {} ({} points)", cloud.source(), cloud.len());
        }
    }

    /// Evicts the residents with the smallest projected size until the
    /// resident points fit the threshold again.
    fn enforce_budget(&mut self) -> bool {
        let threshold = self.config.point_threshold;
        if self.resident_points <= threshold {
            return false;
        }
        let mut residents: Vec<(OctantIndex, f64)> = self
            .resident
            .keys()
            .map(|index| (*index, self.priorities.get(index).copied().unwrap_or(0.0)))
            .collect();
        residents.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        let before = self.resident_points;
        for (index, _) in residents {
            if self.resident_points <= threshold {
                break;
            }
            self.evict(index);
        }
        info!(
            "Resident points {} over threshold {}, evicted down to {}",
            before, threshold, self.resident_points
        );
        true
    }

    /// Queues loads for missing selected octants, largest first.
    fn issue_requests(&mut self) {
        let (Some(hierarchy), Some(workers)) = (&self.hierarchy, &self.workers) else {
            return;
        };
        let mut issued = 0;
        for candidate in &self.selection {
            if issued >= self.config.max_requests_per_update || !workers.has_capacity() {
                break;
            }
            let index = candidate.index;
            let slot = &mut self.slots[usize::from(index)];
            let Some(generation) = slot.request() else {
                continue;
            };
            let octant = &hierarchy[index];
            let request = LoadRequest {
                index,
                generation,
                octant: octant.clone(),
            };
            if workers.try_submit(request) {
                debug!(
                    "Requested octant {} ({} points, {:.1} px)",
                    octant.id, octant.point_count, candidate.projected_size
                );
                self.pending.insert(index);
                self.in_flight += 1;
                issued += 1;
            } else {
                slot.cancel(generation);
                if !slot.is_pending() {
                    self.pending.remove(&index);
                }
                break;
            }
        }
    }

    fn drain_completions(&mut self) -> bool {
        let Some(workers) = &self.workers else {
            return false;
        };
        let completions = workers.drain();
        let mut changed = false;
        for done in completions {
            changed |= self.apply_completion(done);
        }
        changed
    }

    fn apply_completion(&mut self, done: LoadCompletion<P>) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let index = done.index;
        let Some(slot) = self.slots.get_mut(usize::from(index)) else {
            return false;
        };
        let mut changed = false;
        match done.outcome {
            LoadOutcome::Loaded(cloud) => match slot.complete(done.generation, true) {
                Completion::Resident => {
                    debug!("Octant {} resident ({} points)", cloud.source(), cloud.len());
                    self.resident_points += cloud.len() as u64;
                    self.resident.insert(index, Arc::new(cloud));
                    changed = true;
                }
                _ => debug!("Discarding reclaimed load of octant {}", cloud.source()),
            },
            LoadOutcome::Failed(err) => match slot.complete(done.generation, false) {
                Completion::Failed => {
                    warn!("{}", err);
                    self.failed.insert(index);
                }
                _ => debug!("Ignoring failure of a reclaimed load: {}", err),
            },
            LoadOutcome::Cancelled => {
                slot.cancel(done.generation);
            }
        }
        if slot.is_pending() {
            self.pending.insert(index);
        } else {
            self.pending.remove(&index);
        }
        changed
    }

    fn finish_shutdown(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        if self.in_flight > 0 {
            debug!("Waiting for {} loads before shutdown", self.in_flight);
            return false;
        }
        let had_residents = !self.resident.is_empty();
        self.release();
        self.shut_down = true;
        info!("Octant loader shut down");
        had_residents
    }

    /// Drops the root, every payload and the workers.
    fn release(&mut self) {
        if let Some(mut workers) = self.workers.take() {
            if self.in_flight == 0 {
                workers.join();
            }
        }
        self.hierarchy = None;
        self.codec = None;
        self.slots.clear();
        self.resident.clear();
        self.resident_points = 0;
        self.pending.clear();
        self.in_flight = 0;
        self.failed.clear();
        self.selection.clear();
        self.priorities.clear();
        self.visible_points = 0;
        self.texture = VisibleOctreeHierarchyTexture::default();
        self.last_traversal = None;
    }

    fn rebuild_texture(&mut self) {
        self.texture = match &self.hierarchy {
            Some(hierarchy) => VisibleOctreeHierarchyTexture::build(hierarchy, |index| {
                self.resident.contains_key(&index)
            }),
            None => VisibleOctreeHierarchyTexture::default(),
        };
    }
}

impl<P: PointFields> Default for OctantLoader<P> {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}
