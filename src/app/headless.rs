use std::path::PathBuf;

use clap::Parser;
use glam::{Mat4, Vec3};
use rand::prelude::*;

use voxgi::{
    Aabb, BoundsInjector, EntityId, GiResult, GiScene, GiSettings, LayoutId, MaterialId,
    MeshBatch, SceneEntity, ViewId, ViewInput, load_settings, save_settings,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of frames to simulate
    #[arg(long, default_value_t = 240)]
    frames: u64,

    /// Number of synthetic objects in the scene
    #[arg(long, default_value_t = 400)]
    objects: u32,

    /// Seed for scene generation
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Viewer speed in world units per frame
    #[arg(long, default_value_t = 35.0)]
    speed: f32,

    /// Objects moved, removed or spawned per frame
    #[arg(long, default_value_t = 3)]
    churn: u32,

    /// Log a summary every N frames
    #[arg(long, default_value_t = 30)]
    report_every: u64,

    /// Override the number of clipmap levels
    #[arg(long)]
    levels: Option<usize>,

    /// Override the level-0 voxel edge length in world units
    #[arg(long)]
    cell_size: Option<f32>,

    /// Read settings from this file instead of the defaults
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings to this file and exit
    #[arg(long)]
    save_settings: Option<PathBuf>,
}

const MATERIAL_COUNT: u32 = 12;
const LAYOUT_COUNT: u32 = 3;
const WORLD_EXTENT: f32 = 6000.0;

struct SyntheticScene {
    rng: StdRng,
    entities: Vec<SceneEntity>,
    next_id: u64,
}

impl SyntheticScene {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            entities: Vec::new(),
            next_id: 0,
        }
    }

    fn spawn(&mut self) -> SceneEntity {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        let material = self.rng.random_range(0..MATERIAL_COUNT);
        let layout = self.rng.random_range(0..LAYOUT_COUNT);
        let mut batches = vec![MeshBatch::new(LayoutId(layout), MaterialId(material))];
        if self.rng.random_range(0..4) == 0 {
            batches.push(MeshBatch::new(LayoutId(layout), MaterialId(material + MATERIAL_COUNT)));
        }

        let half = Vec3::new(
            self.rng.random_range(10.0..400.0),
            self.rng.random_range(10.0..400.0),
            self.rng.random_range(10.0..200.0),
        );
        let entity = SceneEntity::new(
            id,
            batches,
            Aabb::new(-half, half),
            Mat4::from_translation(self.random_position()),
        );
        self.entities.push(entity.clone());
        entity
    }

    fn random_position(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.random_range(-WORLD_EXTENT..WORLD_EXTENT),
            self.rng.random_range(-WORLD_EXTENT..WORLD_EXTENT),
            self.rng.random_range(0.0..300.0),
        )
    }

    /// Moves a random entity and returns its new state.
    fn shuffle_one(&mut self) -> Option<SceneEntity> {
        if self.entities.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.entities.len());
        let position = self.random_position();
        let entity = &mut self.entities[index];
        entity.transform = Mat4::from_translation(position);
        Some(entity.clone())
    }

    fn remove_one(&mut self) -> Option<EntityId> {
        if self.entities.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.entities.len());
        Some(self.entities.swap_remove(index).id)
    }

    fn solids(&self) -> impl Iterator<Item = Aabb> + '_ {
        self.entities.iter().map(|e| e.world_bounds())
    }
}

pub fn run_headless() -> GiResult<()> {
    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => GiSettings::default(),
    };
    if let Some(levels) = args.levels {
        settings.clipmap = settings.clipmap.with_levels(levels);
    }
    if let Some(cell_size) = args.cell_size {
        settings.clipmap = settings.clipmap.with_cell_size(cell_size);
    }
    settings.validate()?;

    if let Some(path) = &args.save_settings {
        save_settings(path, &settings)?;
        tracing::info!("Settings written to {}", path.display());
        return Ok(());
    }

    let mut scene = GiScene::new(settings)?;
    let sender = scene.scene_sender();
    let mut world = SyntheticScene::new(args.seed);
    for _ in 0..args.objects {
        sender.add(world.spawn());
    }
    tracing::info!(
        objects = args.objects,
        frames = args.frames,
        "Synthetic scene submitted"
    );

    let mut injector = BoundsInjector::new();
    let view = ViewId(0);
    let mut viewer = Vec3::ZERO;
    let mut total_captures = 0usize;
    let mut total_chunks = 0usize;

    for _ in 0..args.frames {
        for _ in 0..args.churn {
            match world.rng.random_range(0..3) {
                0 => {
                    if let Some(entity) = world.shuffle_one() {
                        sender.update(entity);
                    }
                }
                1 => {
                    if let Some(id) = world.remove_one() {
                        sender.remove(id);
                    }
                }
                _ => {
                    sender.add(world.spawn());
                }
            }
        }

        viewer.x += args.speed;
        let outputs = scene.update(&[ViewInput {
            id: view,
            position: viewer,
        }]);

        injector.set_solids(world.solids());
        scene.inject(&outputs, &mut injector);

        total_captures += outputs.captures.len();
        if let Some(view_outputs) = outputs.view(view) {
            total_chunks += view_outputs
                .clipmap
                .levels
                .iter()
                .map(|l| l.update_chunks.len())
                .sum::<usize>();
        }

        if args.report_every > 0 && outputs.frame % args.report_every == 0 {
            let surface = scene.surface();
            let atlas = surface.atlas();
            let atlas_area = atlas.resolution() as u64 * atlas.resolution() as u64;
            let (mapped, free) = scene
                .clipmap(view)
                .map(|c| (c.page_table().mapped_count(), c.pages().free_count()))
                .unwrap_or_default();
            tracing::info!(
                frame = outputs.frame,
                objects = scene.registry().len(),
                surface_caches = surface.live_entries(),
                atlas_used = %format!(
                    "{:.1}%",
                    atlas.allocated_area() as f64 * 100.0 / atlas_area as f64
                ),
                deferred = surface.deferred_captures().len(),
                captures = total_captures,
                chunks = total_chunks,
                pages_mapped = mapped,
                pages_free = free,
                "Frame summary"
            );
        }
    }

    tracing::info!(
        frames = args.frames,
        captures = total_captures,
        chunks = total_chunks,
        "Simulation finished"
    );
    Ok(())
}
