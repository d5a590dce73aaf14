//! Renderer configuration.
//!
//! Configuration is read from TOML. Every field has a default, so a config
//! file only needs to name the values it changes:
//!
//! ```
//! use inflight_core::RendererConfig;
//!
//! let config = RendererConfig::from_toml_str("frames_in_flight = 3").unwrap();
//! assert_eq!(config.frames_in_flight, 3);
//! assert_eq!(config.max_textures, RendererConfig::default().max_textures);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Triangle winding treated as front-facing by the main pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winding {
    /// Clockwise triangles face the camera.
    #[default]
    Clockwise,
    /// Counter-clockwise triangles face the camera.
    CounterClockwise,
}

/// Settings for the frame synchronization core.
///
/// Capacities describe the initial size of each per-slot resource region.
/// Regions grow on demand up to the matching `max_*` value; scenes beyond
/// the maximum are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots in flight (N).
    pub frames_in_flight: usize,
    /// Initial number of primitive transforms each slot can hold.
    pub primitive_capacity: usize,
    /// Hard limit on primitives per scene.
    pub max_primitives: usize,
    /// Initial number of lights each slot can hold.
    pub light_capacity: usize,
    /// Hard limit on lights per scene.
    pub max_lights: usize,
    /// Size of the sampled texture array; texture ids must be below this.
    pub max_textures: usize,
    /// Clear color of the main pass.
    pub clear_color: [f32; 4],
    /// Depth clear value of the main pass.
    pub clear_depth: f32,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Vertex shader file name inside `shader_dir`.
    pub vertex_shader: String,
    /// Fragment shader file name inside `shader_dir`.
    pub fragment_shader: String,
    /// Front-facing winding.
    pub front_face: Winding,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            primitive_capacity: 16,
            max_primitives: 1024,
            light_capacity: 8,
            max_lights: 256,
            max_textures: 16,
            clear_color: [0.002, 0.001, 0.009, 1.0],
            clear_depth: 1.0,
            shader_dir: PathBuf::from("shaders/spv"),
            vertex_shader: "normal-vert.spv".to_string(),
            fragment_shader: "normal-frag.spv".to_string(),
            front_face: Winding::Clockwise,
        }
    }
}

impl RendererConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed TOML and
    /// [`Error::Config`] when a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read, otherwise
    /// the same errors as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every invariant the renderer relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::Config("frames_in_flight must be at least 1".into()));
        }
        check_capacity("primitive", self.primitive_capacity, self.max_primitives)?;
        check_capacity("light", self.light_capacity, self.max_lights)?;
        if self.max_textures == 0 {
            return Err(Error::Config("max_textures must be at least 1".into()));
        }
        if u32::try_from(self.max_textures).is_err() {
            return Err(Error::Config("max_textures does not fit a descriptor count".into()));
        }
        Ok(())
    }

    /// Full path of the vertex shader.
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.vertex_shader)
    }

    /// Full path of the fragment shader.
    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.fragment_shader)
    }
}

fn check_capacity(what: &str, initial: usize, max: usize) -> Result<()> {
    if initial == 0 {
        return Err(Error::Config(format!("{what}_capacity must be at least 1")));
    }
    if initial > max {
        return Err(Error::Config(format!(
            "{what}_capacity ({initial}) exceeds max_{what}s ({max})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.primitive_capacity, 16);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            frames_in_flight = 3
            front_face = "counter_clockwise"
            clear_color = [0.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.front_face, Winding::CounterClockwise);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.max_lights, RendererConfig::default().max_lights);
    }

    #[test]
    fn test_zero_frames_rejected() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_capacity_above_max_rejected() {
        let err =
            RendererConfig::from_toml_str("light_capacity = 32\nmax_lights = 4").unwrap_err();
        assert!(err.to_string().contains("light_capacity"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = RendererConfig::from_toml_str("frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RendererConfig::load("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.toml"));
    }

    #[test]
    fn test_shader_paths_join_dir() {
        let config = RendererConfig::default();
        assert_eq!(
            config.vertex_shader_path(),
            PathBuf::from("shaders/spv/normal-vert.spv")
        );
        assert_eq!(
            config.fragment_shader_path(),
            PathBuf::from("shaders/spv/normal-frag.spv")
        );
    }
}
