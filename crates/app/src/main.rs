//! Headless frames-in-flight demo.
//!
//! Builds a small textured scene, animates it for a few hundred frames on the
//! in-memory backend (including a simulated window resize and a texture swap)
//! and reports how much GPU work the dirty tracking actually issued.
//!
//! Usage: `inflight [config.toml]`

use std::f32::consts::TAU;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use tracing::info;

use inflight_core::{RendererConfig, init_logging};
use inflight_renderer::{FrameOutcome, Renderer};
use inflight_rhi::{HeadlessBackend, vk};
use inflight_scene::{
    DirectionalLight, Material, MaterialId, PointLight, Primitive, Scene, Texture, TextureId,
    Transform,
};

const FRAMES: u64 = 240;
const CUBE_INDICES: u32 = 36;
const GRID: i32 = 3;

const INITIAL_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};

const RESIZED_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1920,
    height: 1080,
};

fn main() -> Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::load(&path)
            .with_context(|| format!("Failed to load renderer config from {path}"))?,
        None => RendererConfig::default(),
    };
    info!(
        "Starting headless demo with {} frames in flight",
        config.frames_in_flight
    );

    let mut backend = HeadlessBackend::new(INITIAL_EXTENT, config.frames_in_flight);
    let mut scene = build_scene(&mut backend);
    let spare_texture = backend.create_texture(vk::Extent2D {
        width: 256,
        height: 256,
    });

    let mut renderer =
        Renderer::initialize(backend, config).context("Failed to initialize renderer")?;
    renderer.bind_scene(&scene)?;

    let mut re_records = 0usize;
    let mut rebuilds = 0usize;
    for frame in 0..FRAMES {
        animate(&mut scene, frame)?;

        if frame == FRAMES / 3 {
            info!(
                "Simulating resize to {}x{}",
                RESIZED_EXTENT.width, RESIZED_EXTENT.height
            );
            renderer.backend_mut().invalidate_swapchain(RESIZED_EXTENT);
        }
        if frame == FRAMES / 2 {
            info!("Swapping albedo texture");
            scene.insert_texture(TextureId(0), Texture::new(spare_texture));
        }

        match renderer.render_one_frame(&mut scene)? {
            FrameOutcome::Presented(report) => {
                if report.re_recorded {
                    re_records += 1;
                }
                if report.swapchain_rebuilt {
                    rebuilds += 1;
                }
            }
            FrameOutcome::SwapchainRebuilt => rebuilds += 1,
        }
    }

    let frames = renderer.frame_count();
    let backend = renderer.shutdown()?;
    let stats = backend.stats();
    info!(
        "Presented {} frames: {} re-records, {} swapchain rebuilds",
        frames, re_records, rebuilds
    );
    info!(
        "Backend work: {} region writes, {} descriptor writes, {} submits, {} pipelines",
        stats.region_writes, stats.descriptor_writes, stats.submits, stats.pipelines_created
    );

    Ok(())
}

/// A grid of cubes sharing one textured material, lit by a sun and a
/// point light.
fn build_scene(backend: &mut HeadlessBackend) -> Scene {
    let mut scene = Scene::default();
    let albedo = backend.create_texture(vk::Extent2D {
        width: 512,
        height: 512,
    });
    let roughness = backend.create_texture(vk::Extent2D {
        width: 512,
        height: 512,
    });
    scene.insert_texture(TextureId(0), Texture::new(albedo));
    scene.insert_texture(TextureId(1), Texture::new(roughness));
    scene.insert_material(
        MaterialId(0),
        Material::textured(TextureId(0), TextureId(1)).with_factors(0.6, 0.1),
    );

    let cube = backend.register_mesh(CUBE_INDICES);
    for x in -GRID..=GRID {
        for z in -GRID..=GRID {
            let transform =
                Transform::new().with_position(Vec3::new(x as f32 * 2.0, 0.0, z as f32 * 2.0));
            scene.add_primitive(
                Primitive::new(cube, CUBE_INDICES, MaterialId(0)),
                transform.matrix(),
            );
        }
    }

    scene.add_light(DirectionalLight::default());
    scene.add_light(PointLight {
        position: Vec3::new(0.0, 4.0, 0.0),
        radius: 12.0,
        ..PointLight::default()
    });
    scene.camera_mut().position = Vec3::new(0.0, 8.0, 14.0);
    scene.camera_mut().look_at(Vec3::ZERO);
    scene
}

/// Orbits the camera every frame, spins the center cube every other frame
/// and pulses the point light every fourth frame.
fn animate(scene: &mut Scene, frame: u64) -> Result<()> {
    let t = frame as f32 / FRAMES as f32;

    let angle = t * TAU;
    let camera = scene.camera_mut();
    camera.position = Vec3::new(angle.sin() * 14.0, 8.0, angle.cos() * 14.0);
    camera.look_at(Vec3::ZERO);

    if frame % 2 == 0 {
        let center = scene.primitive_count() / 2;
        let spin = Mat4::from_quat(Quat::from_rotation_y(angle * 4.0));
        scene.set_xform(center, spin)?;
    }

    if frame % 4 == 0 {
        let pulse = PointLight {
            position: Vec3::new(0.0, 4.0, 0.0),
            radius: 12.0,
            intensity: 1.0 + (angle * 8.0).sin().abs(),
            ..PointLight::default()
        };
        scene.set_light(1, pulse)?;
    }
    Ok(())
}
