use tracing::{debug, error};

use crate::gpu::GpuBackend;
use crate::id::TextureId;
use crate::image_data::Image;

/// A layer's content texture plus at most one image waiting to be uploaded.
///
/// Setting an image while another is still pending drops the older one. Uploading
/// deletes the previous texture before creating the new one.
#[derive(Debug, Default)]
pub(crate) struct TextureSlot {
    pending: Option<Image>,
    texture: Option<TextureId>,
    content_size: (u32, u32),
}

impl TextureSlot {
    pub(crate) fn set_pending(&mut self, image: Image) {
        if let Some(superseded) = self.pending.replace(image) {
            debug!(size = ?superseded.size(), "pending image superseded before upload");
        }
    }

    /// Uploads the pending image, if any. Returns `true` when a new texture is live.
    pub(crate) fn upload(&mut self, gpu: &mut dyn GpuBackend) -> bool {
        let Some(image) = self.pending.take() else {
            return false;
        };

        if let Some(previous) = self.texture.take() {
            gpu.delete_texture(previous);
        }
        self.content_size = (0, 0);

        match gpu.create_texture(&image) {
            Ok(texture) => {
                self.texture = Some(texture);
                self.content_size = image.size();
                true
            }
            Err(err) => {
                error!(size = ?image.size(), error = %err, "content texture upload failed");
                false
            }
        }
    }

    pub(crate) fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Pixel size of the uploaded texture, `(0, 0)` until one is live.
    pub(crate) fn content_size(&self) -> (u32, u32) {
        self.content_size
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.pending = None;
        if let Some(texture) = self.texture.take() {
            gpu.delete_texture(texture);
        }
        self.content_size = (0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::gpu::software::SoftwareBackend;

    fn image(width: u32) -> Image {
        Image::filled(width, 1, Color::WHITE).unwrap()
    }

    #[test]
    fn newest_pending_image_wins() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let mut slot = TextureSlot::default();
        slot.set_pending(image(2));
        slot.set_pending(image(3));

        assert!(slot.upload(&mut gpu));
        assert_eq!(slot.content_size(), (3, 1));
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn reupload_replaces_the_old_texture() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let mut slot = TextureSlot::default();
        slot.set_pending(image(2));
        slot.upload(&mut gpu);
        let first = slot.texture();

        slot.set_pending(image(4));
        slot.upload(&mut gpu);

        assert_ne!(slot.texture(), first);
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn upload_without_pending_is_a_no_op() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let mut slot = TextureSlot::default();
        assert!(!slot.upload(&mut gpu));
        assert_eq!(slot.texture(), None);
    }

    #[test]
    fn release_drops_texture_and_pending_image() {
        let mut gpu = SoftwareBackend::new((4, 4));
        let mut slot = TextureSlot::default();
        slot.set_pending(image(2));
        slot.upload(&mut gpu);
        slot.set_pending(image(3));

        slot.release(&mut gpu);

        assert_eq!(slot.texture(), None);
        assert!(!slot.upload(&mut gpu));
        assert_eq!(gpu.live_textures(), 0);
    }
}
