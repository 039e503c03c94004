// renderer/texture.rs
use std::path::Path;

use crate::asset::AssetCache;
use crate::renderer::device::{GpuTexture, RenderDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

pub trait TextureLookup {
    fn texture(&self, id: TextureId) -> Option<GpuTexture>;
}

struct TextureEntry {
    name: String,
    texture: GpuTexture,
    size: (u32, u32),
}

/// Texture registry. Id 0 is always a 1x1 opaque white texture, which is
/// what the draw loop binds when no material is active.
pub struct TextureStore {
    textures: AssetCache<TextureEntry>,
}

impl TextureStore {
    pub const DEFAULT: TextureId = TextureId(0);

    pub fn new(device: &mut dyn RenderDevice) -> Self {
        let mut store = Self {
            textures: AssetCache::new(),
        };
        let white = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let id = store.load_image(device, "default_white", &white);
        debug_assert_eq!(id, Self::DEFAULT);
        store
    }

    pub fn load_image(
        &mut self,
        device: &mut dyn RenderDevice,
        name: &str,
        image: &image::RgbaImage,
    ) -> TextureId {
        let (width, height) = image.dimensions();
        let texture = device.create_texture(name, width, height, image.as_raw());
        log::debug!("Loaded texture {} ({}x{})", name, width, height);

        TextureId(self.textures.insert(TextureEntry {
            name: name.to_string(),
            texture,
            size: (width, height),
        }))
    }

    pub fn load_from_memory(
        &mut self,
        device: &mut dyn RenderDevice,
        name: &str,
        bytes: &[u8],
    ) -> Result<TextureId, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(self.load_image(device, name, &rgba))
    }

    pub fn load_from_path(
        &mut self,
        device: &mut dyn RenderDevice,
        path: impl AsRef<Path>,
    ) -> Result<TextureId, image::ImageError> {
        let path = path.as_ref();
        log::info!("Loading texture: {:?}", path);

        let rgba = image::open(path)?.to_rgba8();
        let name = path.to_string_lossy();
        Ok(self.load_image(device, &name, &rgba))
    }

    pub fn name(&self, id: TextureId) -> Option<&str> {
        self.textures.get(id.0).map(|entry| entry.name.as_str())
    }

    pub fn size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id.0).map(|entry| entry.size)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl TextureLookup for TextureStore {
    fn texture(&self, id: TextureId) -> Option<GpuTexture> {
        self.textures.get(id.0).map(|entry| entry.texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::RecordingDevice;

    #[test]
    fn default_texture_is_white_and_first() {
        let mut device = RecordingDevice::new();
        let store = TextureStore::new(&mut device);

        let gpu = store.texture(TextureStore::DEFAULT).unwrap();
        assert_eq!(device.texture_size(gpu), Some((1, 1)));
        assert_eq!(store.name(TextureStore::DEFAULT), Some("default_white"));
    }

    #[test]
    fn loads_images_into_device_textures() {
        let mut device = RecordingDevice::new();
        let mut store = TextureStore::new(&mut device);

        let checker = image::RgbaImage::from_fn(4, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let id = store.load_image(&mut device, "checker", &checker);

        assert_eq!(id, TextureId(1));
        assert_eq!(store.size(id), Some((4, 2)));
        assert!(store.texture(TextureId(5)).is_none());
    }

    #[test]
    fn undecodable_bytes_are_reported() {
        let mut device = RecordingDevice::new();
        let mut store = TextureStore::new(&mut device);

        assert!(store
            .load_from_memory(&mut device, "garbage", &[1, 2, 3])
            .is_err());
        assert_eq!(store.len(), 1);
    }
}
