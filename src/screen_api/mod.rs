//! Screen capture. Mirrors [crate::window_api]: a small trait, one backend per platform feature
//! and [GenericScreenCapturer] choosing between them.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

pub mod encode;

use anyhow::Result;
use image::RgbaImage;

#[cfg_attr(test, mockall::automock)]
pub trait ScreenCapturer: Send {
    /// Grabs the current content of the primary screen.
    fn capture(&mut self) -> Result<RgbaImage>;
}

pub struct GenericScreenCapturer {
    inner: Box<dyn ScreenCapturer>,
}

impl GenericScreenCapturer {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Ok(Self {
                    inner: Box::new(win::GdiScreenCapturer::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                Ok(Self {
                    inner: Box::new(x11::X11ScreenCapturer::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No screen capture backend was compiled in, enable the `win` or `x11` feature"
                ))
            }
        }
    }
}

impl ScreenCapturer for GenericScreenCapturer {
    fn capture(&mut self) -> Result<RgbaImage> {
        self.inner.capture()
    }
}
