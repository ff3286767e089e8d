use std::ffi::c_void;

use anyhow::{anyhow, Result};
use image::RgbaImage;
use tracing::{error, instrument};
use windows::Win32::{
    Foundation::HWND,
    Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
        SRCCOPY,
    },
    UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN},
};

use super::ScreenCapturer;

/// Copies the primary screen through GDI. Works for regular desktop sessions, DRM protected
/// content shows up black.
#[derive(Default)]
pub struct GdiScreenCapturer;

impl GdiScreenCapturer {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenCapturer for GdiScreenCapturer {
    #[instrument(skip(self))]
    fn capture(&mut self) -> Result<RgbaImage> {
        unsafe { capture_primary_screen() }
    }
}

unsafe fn capture_primary_screen() -> Result<RgbaImage> {
    unsafe {
        let width = GetSystemMetrics(SM_CXSCREEN);
        let height = GetSystemMetrics(SM_CYSCREEN);
        if width <= 0 || height <= 0 {
            return Err(anyhow!("Primary screen has no size"));
        }

        let screen_dc = GetDC(HWND::default());
        if screen_dc.is_invalid() {
            return Err(anyhow!("Failed to get screen device context"));
        }
        let memory_dc = CreateCompatibleDC(screen_dc);
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(memory_dc, bitmap);

        let copied = BitBlt(memory_dc, 0, 0, width, height, screen_dc, 0, 0, SRCCOPY);

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height gives a top-down bitmap.
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut buffer = vec![0u8; width as usize * height as usize * 4];
        let lines = if copied.is_ok() {
            GetDIBits(
                memory_dc,
                bitmap,
                0,
                height as u32,
                Some(buffer.as_mut_ptr() as *mut c_void),
                &mut info,
                DIB_RGB_COLORS,
            )
        } else {
            0
        };

        SelectObject(memory_dc, previous);
        if !DeleteObject(bitmap).as_bool() {
            error!("Failed to delete capture bitmap");
        }
        if !DeleteDC(memory_dc).as_bool() {
            error!("Failed to delete memory device context");
        }
        ReleaseDC(HWND::default(), screen_dc);

        copied?;
        if lines == 0 {
            return Err(anyhow!("GetDIBits didn't copy any lines"));
        }

        // GDI hands out BGRA.
        for pixel in buffer.chunks_exact_mut(4) {
            pixel.swap(0, 2);
            pixel[3] = 255;
        }
        RgbaImage::from_raw(width as u32, height as u32, buffer)
            .ok_or_else(|| anyhow!("Captured buffer doesn't match screen size"))
    }
}
