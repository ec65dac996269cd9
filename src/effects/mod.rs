//! Full-screen post-processing effects.
//!
//! An effect is a named transform from one image to another, driven by a
//! parameter set with per-effect defaults. This module is the single source
//! of effect names, recognized parameters, and default values; resolving a
//! `(name, params)` pair happens when the chain is built, so a typo'd effect
//! name or parameter is a [`ConfigError`] long before any frame is rendered.
//!
//! The GPU side lives in the stage submodule: one fullscreen pipeline per
//! effect kind, multi-pass orchestration for bloom/blur/dropshadow, and the
//! persistent accumulation state behind `trails`.

mod params;
pub(crate) mod stage;

pub use params::{EffectParams, ParamValue};

/// Chain/effect configuration errors.
///
/// Raised while building nodes, never during a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No effect registered under this name.
    UnknownEffect(String),
    /// The effect exists but doesn't recognize this parameter.
    UnknownParam {
        effect: &'static str,
        param: String,
    },
    /// The parameter exists but was given a value of the wrong type.
    BadParamType {
        effect: &'static str,
        param: &'static str,
        expected: &'static str,
    },
    /// The parameter's value is outside its valid range.
    BadParamValue {
        effect: &'static str,
        param: &'static str,
        reason: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownEffect(name) => write!(f, "unknown effect: '{}'", name),
            ConfigError::UnknownParam { effect, param } => {
                write!(f, "effect '{}' has no parameter '{}'", effect, param)
            }
            ConfigError::BadParamType {
                effect,
                param,
                expected,
            } => write!(
                f,
                "effect '{}' parameter '{}' expects a {}",
                effect, param, expected
            ),
            ConfigError::BadParamValue {
                effect,
                param,
                reason,
            } => write!(
                f,
                "effect '{}' parameter '{}': {}",
                effect, param, reason
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The set of built-in effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Bloom,
    Trails,
    Punch,
    Blur,
    Pixellate,
    Dropshadow,
    Greyscale,
    Sepia,
    Posterize,
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Bloom => "bloom",
            EffectKind::Trails => "trails",
            EffectKind::Punch => "punch",
            EffectKind::Blur => "blur",
            EffectKind::Pixellate => "pixellate",
            EffectKind::Dropshadow => "dropshadow",
            EffectKind::Greyscale => "greyscale",
            EffectKind::Sepia => "sepia",
            EffectKind::Posterize => "posterize",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bloom" => EffectKind::Bloom,
            "trails" => EffectKind::Trails,
            "punch" => EffectKind::Punch,
            "blur" => EffectKind::Blur,
            "pixellate" => EffectKind::Pixellate,
            "dropshadow" => EffectKind::Dropshadow,
            "greyscale" => EffectKind::Greyscale,
            "sepia" => EffectKind::Sepia,
            "posterize" => EffectKind::Posterize,
            _ => return None,
        })
    }
}

/// A fully resolved effect: kind plus every parameter, defaults applied.
///
/// This is what effect-wrapper nodes carry; by the time one exists, the
/// configuration has been validated and frame rendering cannot fail on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectConfig {
    Bloom {
        radius: f32,
        gamma: f32,
        intensity: f32,
    },
    Trails {
        fade: f32,
        alpha: f32,
    },
    Punch {
        factor: f32,
    },
    Blur {
        radius: f32,
    },
    Pixellate {
        pxsize: i32,
        antialias: f32,
    },
    Dropshadow {
        radius: f32,
        opacity: f32,
        offset: glam::Vec2,
    },
    Greyscale {
        amount: f32,
    },
    Sepia {
        amount: f32,
    },
    Posterize {
        levels: i32,
        gamma: f32,
    },
}

impl EffectConfig {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectConfig::Bloom { .. } => EffectKind::Bloom,
            EffectConfig::Trails { .. } => EffectKind::Trails,
            EffectConfig::Punch { .. } => EffectKind::Punch,
            EffectConfig::Blur { .. } => EffectKind::Blur,
            EffectConfig::Pixellate { .. } => EffectKind::Pixellate,
            EffectConfig::Dropshadow { .. } => EffectKind::Dropshadow,
            EffectConfig::Greyscale { .. } => EffectKind::Greyscale,
            EffectConfig::Sepia { .. } => EffectKind::Sepia,
            EffectConfig::Posterize { .. } => EffectKind::Posterize,
        }
    }
}

/// Resolve an effect name and parameter bag into a validated [`EffectConfig`].
///
/// Unknown names, unknown parameters, wrong types, and out-of-range values
/// all fail here — chain-build time — so frames stay infallible with respect
/// to configuration.
pub fn resolve(name: &str, params: &EffectParams) -> Result<EffectConfig, ConfigError> {
    let kind = EffectKind::from_name(name).ok_or_else(|| {
        ConfigError::UnknownEffect(name.to_string())
    })?;
    let effect = kind.name();

    // Defaults first, then overlay whatever the host supplied.
    let mut config = default_config(kind);
    for (param, value) in params.iter() {
        apply_param(&mut config, effect, param, value)?;
    }
    validate(&config, effect)?;
    Ok(config)
}

/// The documented default parameter set for each effect.
pub fn default_config(kind: EffectKind) -> EffectConfig {
    match kind {
        EffectKind::Bloom => EffectConfig::Bloom {
            radius: 10.0,
            gamma: 1.0,
            intensity: 0.5,
        },
        EffectKind::Trails => EffectConfig::Trails {
            fade: 0.9,
            alpha: 1.0,
        },
        EffectKind::Punch => EffectConfig::Punch { factor: 1.0 },
        EffectKind::Blur => EffectConfig::Blur { radius: 10.0 },
        EffectKind::Pixellate => EffectConfig::Pixellate {
            pxsize: 10,
            antialias: 1.0,
        },
        EffectKind::Dropshadow => EffectConfig::Dropshadow {
            radius: 10.0,
            opacity: 1.0,
            offset: glam::Vec2::new(1.0, 1.0),
        },
        EffectKind::Greyscale => EffectConfig::Greyscale { amount: 1.0 },
        EffectKind::Sepia => EffectConfig::Sepia { amount: 1.0 },
        EffectKind::Posterize => EffectConfig::Posterize {
            levels: 2,
            gamma: 0.7,
        },
    }
}

fn apply_param(
    config: &mut EffectConfig,
    effect: &'static str,
    param: &str,
    value: &ParamValue,
) -> Result<(), ConfigError> {
    let unknown = || ConfigError::UnknownParam {
        effect,
        param: param.to_string(),
    };

    macro_rules! float_param {
        ($slot:expr, $name:literal) => {{
            *$slot = value.as_float().ok_or(ConfigError::BadParamType {
                effect,
                param: $name,
                expected: "float",
            })?;
        }};
    }
    macro_rules! int_param {
        ($slot:expr, $name:literal) => {{
            *$slot = value.as_int().ok_or(ConfigError::BadParamType {
                effect,
                param: $name,
                expected: "int",
            })?;
        }};
    }

    match config {
        EffectConfig::Bloom {
            radius,
            gamma,
            intensity,
        } => match param {
            "radius" => float_param!(radius, "radius"),
            "gamma" => float_param!(gamma, "gamma"),
            "intensity" => float_param!(intensity, "intensity"),
            _ => return Err(unknown()),
        },
        EffectConfig::Trails { fade, alpha } => match param {
            "fade" => float_param!(fade, "fade"),
            "alpha" => float_param!(alpha, "alpha"),
            _ => return Err(unknown()),
        },
        EffectConfig::Punch { factor } => match param {
            "factor" => float_param!(factor, "factor"),
            _ => return Err(unknown()),
        },
        EffectConfig::Blur { radius } => match param {
            "radius" => float_param!(radius, "radius"),
            _ => return Err(unknown()),
        },
        EffectConfig::Pixellate { pxsize, antialias } => match param {
            "pxsize" => int_param!(pxsize, "pxsize"),
            "antialias" => float_param!(antialias, "antialias"),
            _ => return Err(unknown()),
        },
        EffectConfig::Dropshadow {
            radius,
            opacity,
            offset,
        } => match param {
            "radius" => float_param!(radius, "radius"),
            "opacity" => float_param!(opacity, "opacity"),
            "offset" => {
                *offset = value.as_vec2().ok_or(ConfigError::BadParamType {
                    effect,
                    param: "offset",
                    expected: "vec2",
                })?;
            }
            _ => return Err(unknown()),
        },
        EffectConfig::Greyscale { amount } | EffectConfig::Sepia { amount } => match param {
            "amount" => float_param!(amount, "amount"),
            _ => return Err(unknown()),
        },
        EffectConfig::Posterize { levels, gamma } => match param {
            "levels" => int_param!(levels, "levels"),
            "gamma" => float_param!(gamma, "gamma"),
            _ => return Err(unknown()),
        },
    }
    Ok(())
}

fn validate(config: &EffectConfig, effect: &'static str) -> Result<(), ConfigError> {
    let bad = |param, reason| ConfigError::BadParamValue {
        effect,
        param,
        reason,
    };
    match config {
        EffectConfig::Bloom { radius, .. } | EffectConfig::Blur { radius } => {
            if *radius <= 0.0 {
                return Err(bad("radius", "must be positive"));
            }
        }
        EffectConfig::Trails { fade, .. } => {
            if !(0.0..=1.0).contains(fade) {
                return Err(bad("fade", "must be in [0, 1]"));
            }
        }
        EffectConfig::Punch { factor } => {
            if *factor <= 0.0 {
                return Err(bad("factor", "must be positive"));
            }
        }
        EffectConfig::Pixellate { pxsize, antialias } => {
            if *pxsize < 1 {
                return Err(bad("pxsize", "must be at least 1"));
            }
            if *antialias < 0.0 {
                return Err(bad("antialias", "must be non-negative"));
            }
        }
        EffectConfig::Dropshadow { radius, .. } => {
            if *radius <= 0.0 {
                return Err(bad("radius", "must be positive"));
            }
        }
        EffectConfig::Posterize { levels, gamma } => {
            if *levels < 1 {
                return Err(bad("levels", "must be at least 1"));
            }
            if *gamma <= 0.0 {
                return Err(bad("gamma", "must be positive"));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Per-frame decay factor for `trails`.
///
/// `fade` is the fraction of brightness retained after one second of real
/// time, so a frame that took `dt` seconds keeps `fade^dt`.
pub(crate) fn trails_decay(fade: f32, dt: f32) -> f32 {
    fade.powf(dt.max(0.0))
}

/// Gaussian kernel half-width for a blur of standard deviation `sigma`.
///
/// Three sigmas either side captures ~99.7% of the kernel mass; the shader
/// loops over `[-taps, taps]` and normalizes.
pub(crate) fn blur_taps(sigma: f32) -> i32 {
    (sigma * 3.0).ceil().max(1.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(
            resolve("bloom", &EffectParams::new()).unwrap(),
            EffectConfig::Bloom {
                radius: 10.0,
                gamma: 1.0,
                intensity: 0.5
            }
        );
        assert_eq!(
            resolve("trails", &EffectParams::new()).unwrap(),
            EffectConfig::Trails {
                fade: 0.9,
                alpha: 1.0
            }
        );
        assert_eq!(
            resolve("punch", &EffectParams::new()).unwrap(),
            EffectConfig::Punch { factor: 1.0 }
        );
        assert_eq!(
            resolve("blur", &EffectParams::new()).unwrap(),
            EffectConfig::Blur { radius: 10.0 }
        );
        assert_eq!(
            resolve("pixellate", &EffectParams::new()).unwrap(),
            EffectConfig::Pixellate {
                pxsize: 10,
                antialias: 1.0
            }
        );
        assert_eq!(
            resolve("dropshadow", &EffectParams::new()).unwrap(),
            EffectConfig::Dropshadow {
                radius: 10.0,
                opacity: 1.0,
                offset: glam::Vec2::new(1.0, 1.0)
            }
        );
        assert_eq!(
            resolve("greyscale", &EffectParams::new()).unwrap(),
            EffectConfig::Greyscale { amount: 1.0 }
        );
        assert_eq!(
            resolve("sepia", &EffectParams::new()).unwrap(),
            EffectConfig::Sepia { amount: 1.0 }
        );
        assert_eq!(
            resolve("posterize", &EffectParams::new()).unwrap(),
            EffectConfig::Posterize {
                levels: 2,
                gamma: 0.7
            }
        );
    }

    #[test]
    fn unknown_effect_fails_at_build() {
        let err = resolve("vignette", &EffectParams::new()).unwrap_err();
        assert_eq!(err, ConfigError::UnknownEffect("vignette".to_string()));
    }

    #[test]
    fn unknown_param_rejected() {
        let err = resolve("blur", &EffectParams::new().with("sigma", 4.0)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParam { effect: "blur", .. }));
    }

    #[test]
    fn wrong_type_rejected() {
        let err = resolve("posterize", &EffectParams::new().with("levels", 2.5)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::BadParamType {
                effect: "posterize",
                param: "levels",
                expected: "int"
            }
        ));
    }

    #[test]
    fn int_accepted_for_float_params() {
        let config = resolve("blur", &EffectParams::new().with("radius", 4)).unwrap();
        assert_eq!(config, EffectConfig::Blur { radius: 4.0 });
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(matches!(
            resolve("trails", &EffectParams::new().with("fade", 1.5)),
            Err(ConfigError::BadParamValue { param: "fade", .. })
        ));
        assert!(matches!(
            resolve("pixellate", &EffectParams::new().with("pxsize", 0)),
            Err(ConfigError::BadParamValue { param: "pxsize", .. })
        ));
        assert!(matches!(
            resolve("posterize", &EffectParams::new().with("levels", 0)),
            Err(ConfigError::BadParamValue { param: "levels", .. })
        ));
    }

    #[test]
    fn trails_decay_integrates_to_fade_over_one_second() {
        // 60 frames of 1/60 s should retain ~fade of the original brightness.
        let fade = 0.9f32;
        let mut remaining = 1.0f32;
        for _ in 0..60 {
            remaining *= trails_decay(fade, 1.0 / 60.0);
        }
        assert!((remaining - fade).abs() < 1e-3);
    }

    #[test]
    fn blur_taps_cover_three_sigma() {
        assert_eq!(blur_taps(1.0), 3);
        assert_eq!(blur_taps(10.0), 30);
        // Tiny blurs still sample at least one neighbor.
        assert_eq!(blur_taps(0.1), 1);
    }

    // CPU mirror of the posterize shader math: bin edges at (i/levels)^gamma,
    // quantized outputs at i/levels.
    fn posterize_channel(c: f32, levels: i32, gamma: f32) -> f32 {
        let u = c.clamp(0.0, 1.0).powf(1.0 / gamma);
        ((u * levels as f32).floor() / levels as f32).min(1.0)
    }

    #[test]
    fn posterize_gradient_has_bounded_palette() {
        let levels = 2;
        let mut seen = std::collections::BTreeSet::new();
        for i in 0..=1000 {
            let c = i as f32 / 1000.0;
            let q = posterize_channel(c, levels, 1.0);
            seen.insert((q * 1000.0).round() as i32);
        }
        // levels+1 distinct per-channel values => at most (levels+1)^3 colors.
        assert_eq!(seen.len(), (levels + 1) as usize);
        assert!(seen.len().pow(3) <= ((levels + 1) as usize).pow(3));
    }

    #[test]
    fn posterize_gamma_moves_bin_edges() {
        // levels=2: at gamma=1 the first edge is 0.5; at gamma=0.5 it rises
        // to 0.5^0.5 ~ 0.707, so 0.6 drops into the bottom bin.
        assert_eq!(posterize_channel(0.6, 2, 1.0), 0.5);
        assert_eq!(posterize_channel(0.6, 2, 0.5), 0.0);
        // Values exactly at 1.0 always land in the top bin.
        assert_eq!(posterize_channel(1.0, 2, 0.5), 1.0);
    }
}
