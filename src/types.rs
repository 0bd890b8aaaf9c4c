use serde::{Deserialize, Serialize};

/// Scene name as known to OBS
pub type SceneName = String;

/// Input (audio source) name as known to OBS
pub type InputName = String;

/// Transition effect used when no effect is given
pub const DEFAULT_TRANSITION_EFFECT: &str = "Cut";

/// Transition duration used when none (or zero) is given
pub const DEFAULT_TRANSITION_DURATION_MS: u32 = 50;

/// Requested switch of the program output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneTransition {
    /// Scene to put on program
    pub scene: SceneName,

    /// Transition effect name, "Cut" if unset
    #[serde(default)]
    pub effect: Option<String>,

    /// Effect duration, 50 ms if unset or zero
    #[serde(default)]
    pub duration_ms: Option<u32>,
}

impl SceneTransition {
    /// Cut to a scene with the default effect and duration
    pub fn cut(scene: impl Into<SceneName>) -> Self {
        Self {
            scene: scene.into(),
            effect: None,
            duration_ms: None,
        }
    }

    /// Transition to a scene with an explicit effect and duration
    pub fn new(scene: impl Into<SceneName>, effect: impl Into<String>, duration_ms: u32) -> Self {
        Self {
            scene: scene.into(),
            effect: Some(effect.into()),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn effect_name(&self) -> &str {
        self.effect.as_deref().unwrap_or(DEFAULT_TRANSITION_EFFECT)
    }

    pub fn duration(&self) -> u32 {
        match self.duration_ms {
            Some(ms) if ms > 0 => ms,
            _ => DEFAULT_TRANSITION_DURATION_MS,
        }
    }
}

/// Requested fader and mute state of one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeTarget {
    pub input: InputName,

    /// Linear volume in `[0, 1]`; out of range values are clamped
    pub volume: f64,

    /// Mute flag, left untouched if unset
    #[serde(default)]
    pub mute: Option<bool>,
}

impl VolumeTarget {
    pub fn new(input: impl Into<InputName>, volume: f64) -> Self {
        Self {
            input: input.into(),
            volume,
            mute: None,
        }
    }

    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = Some(mute);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_defaults() {
        let cut = SceneTransition::cut("Intro");
        assert_eq!(cut.effect_name(), "Cut");
        assert_eq!(cut.duration(), 50);

        let zero = SceneTransition::new("Intro", "Fade", 0);
        assert_eq!(zero.effect_name(), "Fade");
        assert_eq!(zero.duration(), 50);

        assert_eq!(SceneTransition::new("Intro", "Fade", 300).duration(), 300);
    }

    #[test]
    fn transition_deserializes_without_optional_fields() {
        let transition: SceneTransition = serde_json::from_str(r#"{"scene": "Gameplay"}"#).unwrap();
        assert_eq!(transition, SceneTransition::cut("Gameplay"));
    }
}
