//! Start / cancel / reap arbitration for background tasks
//!
//! The scheduler lives on the host's UI thread. Submitting never waits on an
//! older task: the old one is cancelled and parked in a retiring list until
//! its thread exits. `reap` is the only place that installs results and the
//! only place that talks to the host.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::save_tree;
use crate::core::context::{AppContext, ErrorMarker};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::lod::{LodAction, LodController, LodOp, LodPass, SkipReason};
use crate::math::Aabb;
use crate::mesh::{export_stl, MeshBuilder};
use crate::octree::{check_depth_limit, ConstructionEngine, NodePath};
use crate::shape::ShapeHandle;
use crate::task::model::{ModelSnapshot, SubtreeSwap};
use crate::task::handle::{Task, TaskKind, TaskOutput, TaskSignals};

/// Outcome of a task, reported by [`TaskScheduler::reap`]
#[derive(Debug)]
pub enum TaskEvent {
    /// Result was installed
    Finished { kind: TaskKind, generation: u64 },
    Failed { kind: TaskKind, generation: u64, error: Error },
    /// Cancelled or superseded before its result could be used
    Cancelled { kind: TaskKind, generation: u64 },
    /// Completed against a model that has since changed; result dropped
    Stale { kind: TaskKind, generation: u64 },
}

impl TaskEvent {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskEvent::Finished { kind, .. }
            | TaskEvent::Failed { kind, .. }
            | TaskEvent::Cancelled { kind, .. }
            | TaskEvent::Stale { kind, .. } => *kind,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            TaskEvent::Finished { generation, .. }
            | TaskEvent::Failed { generation, .. }
            | TaskEvent::Cancelled { generation, .. }
            | TaskEvent::Stale { generation, .. } => *generation,
        }
    }
}

/// Files an export should produce
#[derive(Clone, Debug, Default)]
pub struct ExportRequest {
    /// Archive of the current tree
    pub archive: Option<PathBuf>,
    /// Binary STL of the current mesh
    pub stl: Option<PathBuf>,
}

/// Runs construct, refine, collapse and export tasks
pub struct TaskScheduler {
    ctx: AppContext,
    engine: Arc<ConstructionEngine>,
    mesher: Arc<MeshBuilder>,
    running: HashMap<TaskKind, Task>,
    retiring: Vec<Task>,
    /// Newest task generation per kind
    latest: HashMap<TaskKind, u64>,
    next_task: u64,
    next_snapshot: u64,
    snapshot: Option<Arc<ModelSnapshot>>,
}

impl TaskScheduler {
    pub fn new(ctx: &AppContext) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            engine: Arc::new(ConstructionEngine::new(ctx)?),
            mesher: Arc::new(MeshBuilder::default()),
            running: HashMap::new(),
            retiring: Vec::new(),
            latest: HashMap::new(),
            next_task: 1,
            next_snapshot: 1,
            snapshot: None,
        })
    }

    /// Current model, if any construct has completed
    pub fn snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot.clone()
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.running.contains_key(&kind)
    }

    /// No task is running or waiting to be reaped
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.retiring.is_empty()
    }

    /// Cancel the running task of `kind`, if any, and park it until it exits
    fn supersede(&mut self, kind: TaskKind) {
        if let Some(task) = self.running.remove(&kind) {
            log::debug!("Cancelling {} task {}", kind, task.generation);
            task.cancel();
            self.retiring.push(task);
        }
    }

    fn start<F>(&mut self, kind: TaskKind, work: F) -> Result<u64>
    where
        F: FnOnce(&TaskSignals) -> Result<Option<TaskOutput>> + Send + 'static,
    {
        let generation = self.next_task;
        self.next_task += 1;
        let task = Task::spawn(kind, generation, work)?;
        self.latest.insert(kind, generation);
        self.running.insert(kind, task);
        log::info!("Started {} task {}", kind, generation);
        Ok(generation)
    }

    /// Build `shape` over `region` as the new baseline model.
    /// Cancels any running construct, refine and collapse. A depth limit
    /// beyond what node paths can address is rejected before anything is
    /// cancelled.
    pub fn submit_construct(&mut self, shape: ShapeHandle, region: Aabb, depth_limit: u8) -> Result<u64> {
        check_depth_limit(depth_limit)?;
        for kind in [TaskKind::Construct, TaskKind::Refine, TaskKind::Collapse] {
            self.supersede(kind);
        }
        let engine = self.engine.clone();
        let mesher = self.mesher.clone();
        self.start(TaskKind::Construct, move |signals| {
            let Some(mut tree) = engine.build(&shape, region, depth_limit, &signals.token)? else {
                return Ok(None);
            };
            if signals.should_stop() {
                return Ok(None);
            }
            engine.install(|| mesher.mesh_tree(&mut tree));
            if signals.should_stop() {
                return Ok(None);
            }
            Ok(Some(TaskOutput::Built(tree)))
        })
    }

    /// Run a refine or collapse decided by the LOD controller
    pub fn submit_lod(&mut self, action: LodAction) -> Result<u64> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| Error::Task("no model to refine or collapse".into()))?;
        let shape_generation = snapshot.shape_generation;
        let kind = match action.op {
            LodOp::Refine => TaskKind::Refine,
            LodOp::Collapse => TaskKind::Collapse,
        };
        self.supersede(kind);

        let engine = self.engine.clone();
        let mesher = self.mesher.clone();
        self.start(kind, move |signals| {
            let Some(subtree) = action.execute(&engine, &mesher, &signals.token)? else {
                return Ok(None);
            };
            if signals.should_stop() {
                return Ok(None);
            }
            Ok(Some(TaskOutput::Swap(SubtreeSwap {
                path: action.path,
                expected: action.expected,
                subtree,
                shape_generation,
            })))
        })
    }

    /// Export a deep copy of the current model
    pub fn submit_export(&mut self, request: ExportRequest) -> Result<u64> {
        let snapshot = self
            .snapshot
            .clone()
            .ok_or_else(|| Error::Task("no model to export".into()))?;
        self.supersede(TaskKind::Export);

        let archive_config = self.ctx.config.archive.clone();
        self.start(TaskKind::Export, move |signals| {
            let tree = (*snapshot.tree).clone();
            let mesh = (*snapshot.mesh).clone();
            drop(snapshot);

            let mut files = Vec::new();
            if let Some(path) = &request.archive {
                match save_tree(&tree, NodePath::root(), path, &archive_config, &signals.token)? {
                    Some(written) => files.extend(written),
                    None => return Ok(None),
                }
            }
            if signals.should_stop() {
                return Ok(None);
            }
            if let Some(path) = &request.stl {
                export_stl(&mesh, path)?;
                files.push(path.clone());
            }
            Ok(Some(TaskOutput::Exported(files)))
        })
    }

    /// Run one LOD pass and submit whatever it decides
    pub fn run_lod_pass(&mut self, lod: &mut LodController) -> Result<LodPass> {
        let Some(snapshot) = self.snapshot.clone() else {
            return Ok(LodPass::Skipped(SkipReason::NoModel));
        };
        let lease_held = !self.running.is_empty();
        let pass = lod.pass(&snapshot, lease_held);
        if let LodPass::Act { refine, collapse } = &pass {
            for action in collapse.iter().chain(refine.iter()) {
                self.submit_lod(action.clone())?;
            }
        }
        Ok(pass)
    }

    /// Collect finished tasks without blocking. Results are installed only
    /// for the newest task of each kind.
    pub fn reap(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();

        let (done, pending): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.retiring).into_iter().partition(Task::is_finished);
        self.retiring = pending;
        for task in done {
            let (kind, generation) = (task.kind, task.generation);
            if let Err(err) = task.join() {
                log::debug!("Superseded {} task {} ended with {}", kind, generation, err);
            }
            events.push(TaskEvent::Cancelled { kind, generation });
        }

        for kind in TaskKind::ALL {
            if !self.running.get(&kind).is_some_and(Task::is_finished) {
                continue;
            }
            if let Some(task) = self.running.remove(&kind) {
                events.push(self.harvest(task));
            }
        }
        events
    }

    fn harvest(&mut self, task: Task) -> TaskEvent {
        let (kind, generation) = (task.kind, task.generation);
        if task.is_cancelled() || self.latest.get(&kind) != Some(&generation) {
            let _ = task.join();
            return TaskEvent::Cancelled { kind, generation };
        }

        let output = match task.join() {
            Ok(Some(output)) => output,
            Ok(None) => return TaskEvent::Cancelled { kind, generation },
            Err(error) => {
                log::warn!("{} task {} failed: {}", kind, generation, error);
                let host = &self.ctx.host;
                host.set_status(&format!("{} failed: {}", kind, error));
                if kind == TaskKind::Construct {
                    host.mark_error(ErrorMarker {
                        message: error.to_string(),
                        region: error.region(),
                    });
                }
                return TaskEvent::Failed { kind, generation, error };
            }
        };

        match output {
            TaskOutput::Built(tree) => {
                let snapshot = ModelSnapshot::new(self.next_snapshot, generation, tree);
                self.next_snapshot += 1;
                let host = &self.ctx.host;
                host.clear_error();
                host.set_status(&format!(
                    "Built {} nodes, {} triangles",
                    snapshot.tree.node_count(),
                    snapshot.mesh.triangle_count()
                ));
                log::info!("Installed model generation {} from construct {}", snapshot.generation, generation);
                self.snapshot = Some(Arc::new(snapshot));
                TaskEvent::Finished { kind, generation }
            }
            TaskOutput::Swap(swap) => {
                let Some(current) = self.snapshot.clone() else {
                    return TaskEvent::Stale { kind, generation };
                };
                let path = swap.path;
                match current.apply(swap, self.next_snapshot) {
                    Ok(Some(next)) => {
                        self.next_snapshot += 1;
                        log::debug!("Applied {} of {} as generation {}", kind, path, next.generation);
                        self.snapshot = Some(Arc::new(next));
                        TaskEvent::Finished { kind, generation }
                    }
                    Ok(None) => {
                        log::debug!("Dropped stale {} of {}", kind, path);
                        TaskEvent::Stale { kind, generation }
                    }
                    Err(error) => {
                        log::warn!("{} of {} failed: {}", kind, path, error);
                        self.ctx.host.set_status(&format!("{} failed: {}", kind, error));
                        TaskEvent::Failed { kind, generation, error }
                    }
                }
            }
            TaskOutput::Exported(files) => {
                self.ctx.host.set_status(&format!("Exported {} file(s)", files.len()));
                log::info!("Export {} wrote {:?}", generation, files);
                TaskEvent::Finished { kind, generation }
            }
        }
    }

    /// Cancel everything and wait for every thread. No result is kept.
    pub fn shutdown(&mut self) {
        let tasks: Vec<Task> = self.running.drain().map(|(_, t)| t).chain(self.retiring.drain(..)).collect();
        if tasks.is_empty() {
            return;
        }
        for task in &tasks {
            task.cancel();
        }
        let count = tasks.len();
        for task in tasks {
            let _ = task.join();
        }
        log::info!("Scheduler shut down, joined {} task(s)", count);
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::archive::load_tree;
    use crate::core::camera::Camera;
    use crate::core::config::EngineConfig;
    use crate::core::context::RecordingHost;
    use crate::core::types::{DVec3, Vec3};
    use crate::lod::{ImportanceSample, SoftwareIdRenderer};
    use crate::math::Interval;
    use crate::octree::NodeState;
    use crate::shape::{Evaluable, Shape};

    /// Shape that sleeps on every interval evaluation
    struct Slow {
        inner: Shape,
        delay: Duration,
    }

    impl Evaluable for Slow {
        fn interval(&self, bounds: &Aabb) -> Interval {
            std::thread::sleep(self.delay);
            self.inner.interval(bounds)
        }

        fn sample(&self, p: DVec3) -> f64 {
            self.inner.sample(p)
        }
    }

    fn sphere(radius: f64) -> ShapeHandle {
        Shape::sphere(DVec3::splat(5.0), radius).into_handle()
    }

    fn slow_sphere(radius: f64) -> ShapeHandle {
        Arc::new(Slow {
            inner: Shape::sphere(DVec3::splat(5.0), radius),
            delay: Duration::from_millis(2),
        })
    }

    fn scheduler() -> (TaskScheduler, Arc<RecordingHost>) {
        let mut config = EngineConfig::default();
        config.lod.base_depth = 2;
        config.lod.max_depth = 4;
        let host = Arc::new(RecordingHost::new());
        let ctx = AppContext::new(config, host.clone());
        (TaskScheduler::new(&ctx).unwrap(), host)
    }

    fn wait_idle(s: &mut TaskScheduler) -> Vec<TaskEvent> {
        let start = Instant::now();
        let mut events = Vec::new();
        loop {
            events.extend(s.reap());
            if s.is_idle() {
                return events;
            }
            assert!(start.elapsed() < Duration::from_secs(60), "tasks did not finish");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_construct_installs_snapshot() {
        let (mut s, host) = scheduler();
        let generation = s.submit_construct(sphere(3.0), Aabb::cube(10.0), 3).unwrap();
        let events = wait_idle(&mut s);

        assert!(matches!(events.as_slice(), [TaskEvent::Finished { kind: TaskKind::Construct, generation: g }] if *g == generation));
        let snapshot = s.snapshot().unwrap();
        assert_eq!(snapshot.shape_generation, generation);
        assert!(snapshot.mesh.triangle_count() > 0);
        assert_eq!(snapshot.mesh.generation, snapshot.generation);
        assert!(host.last_status().unwrap().starts_with("Built"));
    }

    #[test]
    fn test_last_construct_wins() {
        let (mut s, _host) = scheduler();
        let first = s.submit_construct(slow_sphere(2.0), Aabb::cube(10.0), 4).unwrap();
        let second = s.submit_construct(sphere(3.0), Aabb::cube(10.0), 3).unwrap();
        let events = wait_idle(&mut s);

        let finished: Vec<u64> = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::Finished { .. }))
            .map(TaskEvent::generation)
            .collect();
        assert_eq!(finished, vec![second]);
        assert!(events.iter().any(|e| matches!(e, TaskEvent::Cancelled { generation, .. } if *generation == first)));
        assert_eq!(s.snapshot().unwrap().shape_generation, second);
    }

    #[test]
    fn test_finished_but_superseded_result_is_dropped() {
        let (mut s, _host) = scheduler();
        let first = s.submit_construct(sphere(2.0), Aabb::cube(10.0), 2).unwrap();
        // Let the first task finish without reaping it
        let start = Instant::now();
        while !s.running[&TaskKind::Construct].is_finished() {
            assert!(start.elapsed() < Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(1));
        }
        let second = s.submit_construct(slow_sphere(3.0), Aabb::cube(10.0), 3).unwrap();
        let events = wait_idle(&mut s);

        assert!(events.iter().any(|e| matches!(e, TaskEvent::Cancelled { generation, .. } if *generation == first)));
        let snapshot = s.snapshot().unwrap();
        assert_eq!(snapshot.shape_generation, second);
        assert_eq!(events.iter().filter(|e| matches!(e, TaskEvent::Finished { .. })).count(), 1);
    }

    #[test]
    fn test_shutdown_retains_nothing() {
        let (mut s, _host) = scheduler();
        s.submit_construct(slow_sphere(3.0), Aabb::cube(10.0), 6).unwrap();
        s.submit_construct(slow_sphere(2.5), Aabb::cube(10.0), 6).unwrap();
        s.shutdown();
        assert!(s.is_idle());
        assert!(s.snapshot().is_none());
        assert!(s.reap().is_empty());
    }

    #[test]
    fn test_failure_marks_host() {
        let (mut s, host) = scheduler();
        let broken = Shape::sphere(DVec3::splat(5.0), 3.0)
            .union(Shape::sphere(DVec3::splat(5.0), f64::NAN))
            .into_handle();
        s.submit_construct(broken, Aabb::cube(10.0), 3).unwrap();
        let events = wait_idle(&mut s);

        assert!(matches!(events.as_slice(), [TaskEvent::Failed { error: Error::Evaluation { .. }, .. }]));
        assert!(s.snapshot().is_none());
        let marker = host.error().unwrap();
        assert!(marker.region.is_some());
        assert!(host.last_status().unwrap().contains("construct failed"));
    }

    #[test]
    fn test_cancelled_construct_is_silent() {
        let (mut s, host) = scheduler();
        s.submit_construct(slow_sphere(3.0), Aabb::cube(10.0), 6).unwrap();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);
        assert!(host.error().is_none());
        assert!(host.statuses().iter().all(|status| !status.contains("failed")));
    }

    #[test]
    fn test_lod_pass_refines_through_scheduler() {
        let (mut s, _host) = scheduler();
        let ctx = s.ctx.clone();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);
        let before = s.snapshot().unwrap();

        let mut lod = LodController::new(&ctx);
        lod.set_camera(Camera::look_at(Vec3::new(5.0, 5.0, 9.0), Vec3::new(5.0, 5.0, 8.0), Vec3::Y));
        let LodPass::Act { refine: Some(refine), .. } = s.run_lod_pass(&mut lod).unwrap() else {
            panic!("expected a refine");
        };
        // Busy until the refine is reaped
        assert!(matches!(s.run_lod_pass(&mut lod).unwrap(), LodPass::Skipped(SkipReason::LeaseHeld)));

        let events = wait_idle(&mut s);
        assert!(matches!(events.as_slice(), [TaskEvent::Finished { kind: TaskKind::Refine, .. }]));
        let after = s.snapshot().unwrap();
        assert!(after.generation > before.generation);
        assert_eq!(after.shape_generation, before.shape_generation);
        assert_eq!(after.tree.get(&refine.path).unwrap().state(), NodeState::Branch);
    }

    #[test]
    fn test_construct_cancels_running_refine() {
        let (mut s, _host) = scheduler();
        let ctx = s.ctx.clone();
        s.submit_construct(slow_sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);

        let mut lod = LodController::new(&ctx);
        lod.set_camera(Camera::look_at(Vec3::new(5.0, 5.0, 9.0), Vec3::new(5.0, 5.0, 8.0), Vec3::Y));
        assert!(matches!(s.run_lod_pass(&mut lod).unwrap(), LodPass::Act { refine: Some(_), .. }));
        assert!(s.is_running(TaskKind::Refine));

        let construct = s.submit_construct(sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        assert!(!s.is_running(TaskKind::Refine));
        let events = wait_idle(&mut s);

        assert!(events.iter().any(|e| e.kind() == TaskKind::Refine && matches!(e, TaskEvent::Cancelled { .. })));
        assert!(!events.iter().any(|e| e.kind() == TaskKind::Refine && matches!(e, TaskEvent::Finished { .. })));
        assert_eq!(s.snapshot().unwrap().shape_generation, construct);
    }

    #[test]
    fn test_export_writes_files() {
        let (mut s, host) = scheduler();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 3).unwrap();
        wait_idle(&mut s);
        let snapshot = s.snapshot().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let request = ExportRequest {
            archive: Some(dir.path().join("model.sto")),
            stl: Some(dir.path().join("model.stl")),
        };
        s.submit_export(request).unwrap();
        let events = wait_idle(&mut s);
        assert!(matches!(events.as_slice(), [TaskEvent::Finished { kind: TaskKind::Export, .. }]));

        let loaded = load_tree(&dir.path().join("model.sto")).unwrap();
        assert_eq!(loaded.node_count(), snapshot.tree.node_count());
        let stl_len = std::fs::metadata(dir.path().join("model.stl")).unwrap().len();
        assert_eq!(stl_len, 84 + 50 * snapshot.mesh.triangle_count() as u64);
        assert!(host.last_status().unwrap().starts_with("Exported"));
    }

    #[test]
    fn test_export_io_failure_reports_and_leaves_nothing() {
        let (mut s, host) = scheduler();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 3).unwrap();
        wait_idle(&mut s);

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let request = ExportRequest {
            archive: Some(blocker.join("model.sto")),
            stl: None,
        };
        s.submit_export(request).unwrap();
        let events = wait_idle(&mut s);

        assert!(matches!(
            events.as_slice(),
            [TaskEvent::Failed { kind: TaskKind::Export, error: Error::Io(_), .. }]
        ));
        assert!(host.last_status().unwrap().starts_with("export failed"));
        assert!(host.error().is_none());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(s.snapshot().is_some());
    }

    #[test]
    fn test_swap_at_missing_path_reports_failure() {
        let (mut s, host) = scheduler();
        let shape = sphere(3.0);
        s.submit_construct(shape.clone(), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);
        let before = s.snapshot().unwrap();

        let path = (0..6).fold(NodePath::root(), |p, _| p.child(0));
        assert!(before.tree.get(&path).is_none());
        let bounds = (0..6).fold(Aabb::cube(10.0), |b, _| b.child_octant(0));
        let action = LodAction {
            op: LodOp::Refine,
            path,
            bounds,
            depth: 6,
            expected: NodeState::Leaf,
            source: crate::octree::SourceDescriptor::Expression(shape),
            importance: 1.0,
        };
        s.submit_lod(action).unwrap();
        let events = wait_idle(&mut s);

        assert!(matches!(
            events.as_slice(),
            [TaskEvent::Failed { kind: TaskKind::Refine, error: Error::InvalidPath(_), .. }]
        ));
        assert!(host.last_status().unwrap().starts_with("refine failed"));
        assert_eq!(s.snapshot().unwrap().generation, before.generation);
    }

    #[test]
    fn test_construct_beyond_path_depth_is_rejected() {
        let (mut s, _host) = scheduler();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);
        let before = s.snapshot().unwrap().generation;

        let tiny = Shape::sphere(DVec3::ZERO, 1e-3).into_handle();
        let err = s.submit_construct(tiny, Aabb::cube(1000.0), 22).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(s.is_idle());
        assert!(s.reap().is_empty());
        assert_eq!(s.snapshot().unwrap().generation, before);
    }

    #[test]
    fn test_export_without_model_fails() {
        let (mut s, _host) = scheduler();
        assert!(s.submit_export(ExportRequest::default()).is_err());
    }

    /// Readers sample importance on published snapshots while the scheduler
    /// keeps swapping subtrees in and out.
    #[test]
    fn test_sampling_while_swapping() {
        let (mut s, _host) = scheduler();
        let ctx = s.ctx.clone();
        s.submit_construct(sphere(3.0), Aabb::cube(10.0), 2).unwrap();
        wait_idle(&mut s);

        let published: Arc<Mutex<Arc<ModelSnapshot>>> = Arc::new(Mutex::new(s.snapshot().unwrap()));
        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..2)
            .map(|i| {
                let published = published.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    let camera = Camera::look_at(Vec3::new(5.0, 5.0 + i as f32, 12.0), Vec3::splat(5.0), Vec3::Y);
                    let mut samples = 0;
                    while !stop.load(Ordering::Relaxed) {
                        let snapshot = published.lock().unwrap().clone();
                        let sample = ImportanceSample::capture(
                            &SoftwareIdRenderer,
                            &camera,
                            &snapshot.tree,
                            snapshot.generation,
                            (64, 48),
                        );
                        assert!(sample.subtree(&NodePath::root()) <= 1.0);
                        assert_eq!(snapshot.mesh.generation, snapshot.generation);
                        let volume: f64 = snapshot.tree.cells().iter().map(|c| c.volume()).sum();
                        assert!((volume - 1000.0).abs() < 1e-6);
                        samples += 1;
                    }
                    samples
                })
            })
            .collect();

        let mut lod = LodController::new(&ctx);
        let near = Camera::look_at(Vec3::new(5.0, 5.0, 9.0), Vec3::new(5.0, 5.0, 8.0), Vec3::Y);
        let far = Camera::look_at(Vec3::new(5.0, 5.0, 200.0), Vec3::splat(5.0), Vec3::Y);
        for round in 0..8 {
            lod.set_camera(if round % 2 == 0 { near } else { far });
            s.run_lod_pass(&mut lod).unwrap();
            wait_idle(&mut s);
            *published.lock().unwrap() = s.snapshot().unwrap();
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        // Alternating near/far ends on a collapse back to the base tree
        let snapshot = s.snapshot().unwrap();
        assert_eq!(snapshot.tree.max_depth(), 2);
    }
}
