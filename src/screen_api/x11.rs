use anyhow::{anyhow, bail, Result};
use image::RgbaImage;
use tracing::instrument;
use xcb::{
    x::{self, Drawable, ImageFormat, Window},
    Connection,
};

use super::ScreenCapturer;

/// Captures the root window of the preferred screen with `GetImage`.
pub struct X11ScreenCapturer {
    connection: Connection,
    root: Window,
    width: u16,
    height: u16,
}

impl X11ScreenCapturer {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = Connection::connect(None)?;
        let (root, width, height) = {
            let screen = connection
                .get_setup()
                .roots()
                .nth(preferred_screen.max(0) as usize)
                .ok_or_else(|| anyhow!("X11 screen {preferred_screen} doesn't exist"))?;
            (
                screen.root(),
                screen.width_in_pixels(),
                screen.height_in_pixels(),
            )
        };
        Ok(Self {
            connection,
            root,
            width,
            height,
        })
    }
}

impl ScreenCapturer for X11ScreenCapturer {
    #[instrument(skip(self))]
    fn capture(&mut self) -> Result<RgbaImage> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&x::GetImage {
                format: ImageFormat::ZPixmap,
                drawable: Drawable::Window(self.root),
                x: 0,
                y: 0,
                width: self.width,
                height: self.height,
                plane_mask: u32::MAX,
            }))?;

        if reply.depth() != 24 && reply.depth() != 32 {
            bail!("Unsupported root window depth {}", reply.depth());
        }

        // ZPixmap with 24/32 bit depth is laid out as BGRX.
        let data = reply.data();
        let pixels = self.width as usize * self.height as usize;
        if data.len() < pixels * 4 {
            bail!(
                "GetImage returned {} bytes for a {}x{} screen",
                data.len(),
                self.width,
                self.height
            );
        }
        let mut rgba = Vec::with_capacity(pixels * 4);
        for bgrx in data[..pixels * 4].chunks_exact(4) {
            rgba.extend_from_slice(&[bgrx[2], bgrx[1], bgrx[0], 255]);
        }
        RgbaImage::from_raw(self.width as u32, self.height as u32, rgba)
            .ok_or_else(|| anyhow!("Captured buffer doesn't match screen size"))
    }
}
