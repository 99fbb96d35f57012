// src/export/readback.rs

use crate::error::RenderError;

/// Bytes per row of a BGRA copy, rounded up to what buffer copies require
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip row padding from a mapped copy into `out`, which ends up exactly `width * height * 4` bytes
pub fn unpad_rows(padded: &[u8], width: u32, height: u32, padded_row: u32, out: &mut Vec<u8>) {
    let row = width as usize * 4;
    out.clear();
    out.reserve(row * height as usize);
    for chunk in padded.chunks(padded_row as usize).take(height as usize) {
        out.extend_from_slice(&chunk[..row]);
    }
}

/// Host-mappable copy of the final target
pub struct FrameReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
}

impl FrameReadback {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let padded_row = padded_bytes_per_row(width);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Readback Buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        FrameReadback {
            buffer,
            width,
            height,
            padded_row,
        }
    }

    /// Copy `texture` to the host, top row first, blocking until the GPU is done
    pub fn read(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        out: &mut Vec<u8>,
    ) -> Result<(), RenderError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = crossbeam_channel::bounded(1);
        let slice = self.buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::Readback(wgpu::BufferAsyncError)),
        }

        {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, self.width, self.height, self.padded_row, out);
        }
        self.buffer.unmap();
        Ok(())
    }
}

impl Drop for FrameReadback {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}
