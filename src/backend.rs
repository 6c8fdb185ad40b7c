use std::fmt;
use std::sync::Arc;

#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use crate::combine::{BlendState, CombineState};

/// A screen space vertex as handed to the backend. Coordinates are already scaled to the
/// output resolution, `q` is 1/w and the texture coordinates are in texels of the uploaded
/// (power of two) texture.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub x    : f32,
    pub y    : f32,
    pub z    : f32,
    pub q    : f32,
    pub u0   : f32,
    pub v0   : f32,
    pub u1   : f32,
    pub v1   : f32,
    pub color: [u8; 4], // r, g, b, a
    pub fog  : f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    TriangleStrip,
    TriangleFan,
    Triangles,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub ul_x: u32,
    pub ul_y: u32,
    pub lr_x: u32,
    pub lr_y: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.lr_x.saturating_sub(self.ul_x)
    }

    pub fn height(&self) -> u32 {
        self.lr_y.saturating_sub(self.ul_y)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClampMode {
    Wrap,
    Mirror,
    Clamp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Bilinear,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClearTarget {
    // RGBA8888
    Color(u32),
    Depth(u16),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Surface {
    Back,
    Front,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// A decoded texture ready for upload. Pixels are RGBA8888 (r in the top byte), `width`
/// texels per row.
#[derive(Debug)]
pub struct TextureUpload<'a> {
    pub width : u32,
    pub height: u32,
    // log2 of the larger dimension
    pub lod   : u32,
    // log2(width/height), negative when the texture is taller than wide
    pub aspect: i32,
    pub pixels: &'a [u32],
}

impl TextureUpload<'_> {
    pub fn size_in_bytes(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    OutOfTextureMemory { needed: usize, available: usize },
    Lost(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::OutOfTextureMemory { needed, available } => {
                write!(f, "out of texture memory ({} bytes needed, {} available)", needed, available)
            },
            BackendError::Lost(why) => write!(f, "device lost: {}", why),
        }
    }
}

impl std::error::Error for BackendError {}

/// Everything the interpreter needs from a graphics API
pub trait Backend {
    fn draw(&mut self, kind: PrimitiveKind, vertices: &[Vertex]);
    fn set_combine(&mut self, combine: &CombineState);
    fn set_blend(&mut self, blend: &BlendState);
    fn set_scissor(&mut self, rect: Rect);

    fn upload_texture(&mut self, tmu: usize, upload: &TextureUpload) -> Result<TextureHandle, BackendError>;
    fn bind_texture(&mut self, tmu: usize, handle: TextureHandle, clamp: [ClampMode; 2], filter: FilterMode);
    /// Free every texture uploaded so far
    fn release_textures(&mut self);

    fn clear(&mut self, target: ClearTarget, rect: Rect);
    fn copy_region(&mut self, from: Surface, to: Surface, rect: Rect);
    /// Read back a region of a surface as RGB565, row major. None if the backend can't
    /// read back.
    fn read_region(&mut self, from: Surface, rect: Rect) -> Option<Vec<u16>>;
    fn swap_buffers(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Draw { kind: PrimitiveKind, vertices: Vec<Vertex> },
    SetCombine(CombineState),
    SetBlend(BlendState),
    SetScissor(Rect),
    UploadTexture { tmu: usize, handle: TextureHandle, width: u32, height: u32, lod: u32, aspect: i32, pixels: Vec<u32> },
    BindTexture { tmu: usize, handle: TextureHandle, clamp: [ClampMode; 2], filter: FilterMode },
    ReleaseTextures,
    Clear { target: ClearTarget, rect: Rect },
    CopyRegion { from: Surface, to: Surface, rect: Rect },
    SwapBuffers,
}

pub type RenderCommandBuffer = atomicring::AtomicRingBuffer<RenderCommand>;

/// A backend that turns every call into a `RenderCommand` for a render thread to consume.
/// Texture memory is accounted against a fixed budget so exhaustion behaves like a real
/// device.
pub struct CommandBufferBackend {
    command_buffer: Arc<RenderCommandBuffer>,

    texture_memory: usize,
    texture_memory_used: usize,
    next_handle: u32,

    // contents of the last read_region() answer, filled by the render side
    readback: Option<Vec<u16>>,
}

impl CommandBufferBackend {
    pub fn new(command_buffer: Arc<RenderCommandBuffer>, texture_memory: usize) -> Self {
        Self {
            command_buffer     : command_buffer,
            texture_memory     : texture_memory,
            texture_memory_used: 0,
            next_handle        : 1,
            readback           : None,
        }
    }

    pub fn command_buffer(&self) -> Arc<RenderCommandBuffer> {
        self.command_buffer.clone()
    }

    pub fn texture_memory_used(&self) -> usize {
        self.texture_memory_used
    }

    /// Pixels handed back by the next read_region() call
    pub fn set_readback(&mut self, pixels: Option<Vec<u16>>) {
        self.readback = pixels;
    }

    fn send(&mut self, command: RenderCommand) {
        // the render thread drains the buffer, so wait for room
        let mut command = command;
        loop {
            match self.command_buffer.try_push(command) {
                Ok(_) => break,
                Err(c) => {
                    command = c;
                    std::thread::yield_now();
                },
            };
        }
    }
}

impl Backend for CommandBufferBackend {
    fn draw(&mut self, kind: PrimitiveKind, vertices: &[Vertex]) {
        self.send(RenderCommand::Draw { kind: kind, vertices: vertices.to_vec() });
    }

    fn set_combine(&mut self, combine: &CombineState) {
        self.send(RenderCommand::SetCombine(combine.clone()));
    }

    fn set_blend(&mut self, blend: &BlendState) {
        self.send(RenderCommand::SetBlend(*blend));
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.send(RenderCommand::SetScissor(rect));
    }

    fn upload_texture(&mut self, tmu: usize, upload: &TextureUpload) -> Result<TextureHandle, BackendError> {
        let needed = upload.size_in_bytes();
        let available = self.texture_memory - self.texture_memory_used;
        if needed > available {
            debug!(target: "BACKEND", "upload of {}x{} failed, {} bytes available", upload.width, upload.height, available);
            return Err(BackendError::OutOfTextureMemory { needed: needed, available: available });
        }

        self.texture_memory_used += needed;
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;

        self.send(RenderCommand::UploadTexture {
            tmu   : tmu,
            handle: handle,
            width : upload.width,
            height: upload.height,
            lod   : upload.lod,
            aspect: upload.aspect,
            pixels: upload.pixels.to_vec(),
        });

        Ok(handle)
    }

    fn bind_texture(&mut self, tmu: usize, handle: TextureHandle, clamp: [ClampMode; 2], filter: FilterMode) {
        self.send(RenderCommand::BindTexture { tmu: tmu, handle: handle, clamp: clamp, filter: filter });
    }

    fn release_textures(&mut self) {
        self.texture_memory_used = 0;
        self.send(RenderCommand::ReleaseTextures);
    }

    fn clear(&mut self, target: ClearTarget, rect: Rect) {
        self.send(RenderCommand::Clear { target: target, rect: rect });
    }

    fn copy_region(&mut self, from: Surface, to: Surface, rect: Rect) {
        self.send(RenderCommand::CopyRegion { from: from, to: to, rect: rect });
    }

    fn read_region(&mut self, _from: Surface, rect: Rect) -> Option<Vec<u16>> {
        let wanted = (rect.width() * rect.height()) as usize;
        match &self.readback {
            Some(pixels) if pixels.len() >= wanted => Some(pixels[..wanted].to_vec()),
            _ => None,
        }
    }

    fn swap_buffers(&mut self) {
        self.send(RenderCommand::SwapBuffers);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn drain(buffer: &RenderCommandBuffer) -> Vec<RenderCommand> {
        let mut v = vec![];
        while let Some(c) = buffer.try_pop() {
            v.push(c);
        }
        v
    }

    #[test]
    fn test_upload_accounts_texture_memory() {
        let buffer = Arc::new(RenderCommandBuffer::with_capacity(64));
        let mut backend = CommandBufferBackend::new(buffer.clone(), 32 * 32 * 4 + 16);

        let pixels = vec![0xFF00_00FFu32; 32 * 32];
        let upload = TextureUpload { width: 32, height: 32, lod: 5, aspect: 0, pixels: &pixels };
        let handle = backend.upload_texture(0, &upload).expect("first upload fits");
        assert_eq!(handle, TextureHandle(1));
        assert_eq!(backend.texture_memory_used(), 4096);

        match backend.upload_texture(0, &upload) {
            Err(BackendError::OutOfTextureMemory { needed, available }) => {
                assert_eq!(needed, 4096);
                assert_eq!(available, 16);
            },
            other => panic!("expected out of memory, got {:?}", other),
        }

        backend.release_textures();
        assert_eq!(backend.texture_memory_used(), 0);
        assert!(backend.upload_texture(1, &upload).is_ok());

        let commands = drain(&buffer);
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], RenderCommand::UploadTexture { tmu: 0, .. }));
        assert_eq!(commands[1], RenderCommand::ReleaseTextures);
        assert!(matches!(commands[2], RenderCommand::UploadTexture { tmu: 1, handle: TextureHandle(2), .. }));
    }

    #[test]
    fn test_read_region_without_readback() {
        let buffer = Arc::new(RenderCommandBuffer::with_capacity(4));
        let mut backend = CommandBufferBackend::new(buffer, 0);
        let rect = Rect { ul_x: 0, ul_y: 0, lr_x: 2, lr_y: 2 };
        assert_eq!(backend.read_region(Surface::Back, rect), None);
        backend.set_readback(Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(backend.read_region(Surface::Back, rect), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_vertex_is_pod() {
        let v = [Vertex { x: 1.0, color: [1, 2, 3, 4], ..Default::default() }];
        let bytes: &[u8] = bytemuck::cast_slice(&v);
        assert_eq!(bytes.len(), std::mem::size_of::<Vertex>());
        assert_eq!(&bytes[32..36], &[1, 2, 3, 4]);
    }
}
