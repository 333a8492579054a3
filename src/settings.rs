use crate::models::{BACKGROUNDS, ContainerSize, ResizeRequest, Settings};
use thiserror::Error;

pub const MIN_CONTAINER_WIDTH: f64 = 200.0;
pub const MIN_CONTAINER_HEIGHT: f64 = 100.0;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("unknown background: {0}")]
    UnknownBackground(String),
    #[error("container id must not be empty")]
    EmptyContainerId,
    #[error("resize values must be finite numbers")]
    InvalidResize,
}

pub fn is_known_background(url: &str) -> bool {
    BACKGROUNDS.contains(&url)
}

impl Settings {
    pub fn set_background(&mut self, url: &str) -> Result<(), SettingsError> {
        if !is_known_background(url) {
            return Err(SettingsError::UnknownBackground(url.to_string()));
        }
        self.current_background = url.to_string();
        Ok(())
    }

    /// Applies a finished drag and stores the resulting size for `container_id`.
    pub fn apply_resize(
        &mut self,
        container_id: &str,
        drag: &ResizeRequest,
    ) -> Result<ContainerSize, SettingsError> {
        let container_id = container_id.trim();
        if container_id.is_empty() {
            return Err(SettingsError::EmptyContainerId);
        }
        let size = resized(drag)?;
        self.container_sizes.insert(container_id.to_string(), size);
        Ok(size)
    }

    pub fn reset_container_sizes(&mut self) {
        self.container_sizes.clear();
    }
}

pub fn resized(drag: &ResizeRequest) -> Result<ContainerSize, SettingsError> {
    let values = [drag.start_width, drag.start_height, drag.delta_x, drag.delta_y];
    if values.iter().any(|value| !value.is_finite()) {
        return Err(SettingsError::InvalidResize);
    }
    Ok(ContainerSize {
        width: (drag.start_width + drag.delta_x).max(MIN_CONTAINER_WIDTH),
        height: (drag.start_height + drag.delta_y).max(MIN_CONTAINER_HEIGHT),
    })
}
