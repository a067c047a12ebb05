// easing.rs — progress shaping functions for animations

use std::f64::consts::PI;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::ViewerError;

#[derive(Clone, Default)]
pub enum Easing {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
    Custom(Rc<dyn Fn(f64) -> f64>),
}

impl Easing {
    pub fn custom(f: impl Fn(f64) -> f64 + 'static) -> Self {
        Easing::Custom(Rc::new(f))
    }

    /// Shape `t ∈ [0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,

            Easing::InQuad => t * t,
            Easing::OutQuad => t * (2.0 - t),
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }

            Easing::InCubic => t * t * t,
            Easing::OutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    (t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0
                }
            }

            Easing::InQuart => t * t * t * t,
            Easing::OutQuart => {
                let u = t - 1.0;
                1.0 - u * u * u * u
            }
            Easing::InOutQuart => {
                if t < 0.5 {
                    8.0 * t * t * t * t
                } else {
                    let u = t - 1.0;
                    1.0 - 8.0 * u * u * u * u
                }
            }

            Easing::InQuint => t * t * t * t * t,
            Easing::OutQuint => {
                let u = t - 1.0;
                1.0 + u * u * u * u * u
            }
            Easing::InOutQuint => {
                if t < 0.5 {
                    16.0 * t * t * t * t * t
                } else {
                    let u = t - 1.0;
                    1.0 + 16.0 * u * u * u * u * u
                }
            }

            Easing::InSine => 1.0 - (t * PI / 2.0).cos(),
            Easing::OutSine => (t * PI / 2.0).sin(),
            Easing::InOutSine => 0.5 - 0.5 * (PI * t).cos(),

            Easing::InExpo => {
                if t == 0.0 {
                    0.0
                } else {
                    2f64.powf(10.0 * (t - 1.0))
                }
            }
            Easing::OutExpo => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Easing::InOutExpo => {
                if t == 0.0 {
                    0.0
                } else if t == 1.0 {
                    1.0
                } else if t < 0.5 {
                    0.5 * 2f64.powf(20.0 * t - 10.0)
                } else {
                    1.0 - 0.5 * 2f64.powf(-20.0 * t + 10.0)
                }
            }

            Easing::InCirc => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Easing::OutCirc => {
                let u = t - 1.0;
                (1.0 - u * u).max(0.0).sqrt()
            }
            Easing::InOutCirc => {
                if t < 0.5 {
                    (1.0 - (1.0 - 4.0 * t * t).max(0.0).sqrt()) / 2.0
                } else {
                    (1.0 + (-3.0 + 8.0 * t - 4.0 * t * t).max(0.0).sqrt()) / 2.0
                }
            }

            Easing::Custom(f) => f(t),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::InQuad => "inQuad",
            Easing::OutQuad => "outQuad",
            Easing::InOutQuad => "inOutQuad",
            Easing::InCubic => "inCubic",
            Easing::OutCubic => "outCubic",
            Easing::InOutCubic => "inOutCubic",
            Easing::InQuart => "inQuart",
            Easing::OutQuart => "outQuart",
            Easing::InOutQuart => "inOutQuart",
            Easing::InQuint => "inQuint",
            Easing::OutQuint => "outQuint",
            Easing::InOutQuint => "inOutQuint",
            Easing::InSine => "inSine",
            Easing::OutSine => "outSine",
            Easing::InOutSine => "inOutSine",
            Easing::InExpo => "inExpo",
            Easing::OutExpo => "outExpo",
            Easing::InOutExpo => "inOutExpo",
            Easing::InCirc => "inCirc",
            Easing::OutCirc => "outCirc",
            Easing::InOutCirc => "inOutCirc",
            Easing::Custom(_) => "custom",
        }
    }
}

const NAMED: [Easing; 22] = [
    Easing::Linear,
    Easing::InQuad,
    Easing::OutQuad,
    Easing::InOutQuad,
    Easing::InCubic,
    Easing::OutCubic,
    Easing::InOutCubic,
    Easing::InQuart,
    Easing::OutQuart,
    Easing::InOutQuart,
    Easing::InQuint,
    Easing::OutQuint,
    Easing::InOutQuint,
    Easing::InSine,
    Easing::OutSine,
    Easing::InOutSine,
    Easing::InExpo,
    Easing::OutExpo,
    Easing::InOutExpo,
    Easing::InCirc,
    Easing::OutCirc,
    Easing::InOutCirc,
];

impl FromStr for Easing {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAMED
            .iter()
            .find(|e| e.name() == s.trim())
            .cloned()
            .ok_or_else(|| ViewerError::UnknownEasing(s.to_string()))
    }
}

impl fmt::Debug for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
