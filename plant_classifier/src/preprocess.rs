use crate::{
    config::{InputSpec, TensorLayout},
    error::ClassifierError,
};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};

pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, ClassifierError> {
    if image_data.is_empty() {
        return Err(ClassifierError::EmptyImage);
    }

    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| ClassifierError::Decode(e.to_string()))?;

    image_reader
        .decode()
        .map_err(|e| ClassifierError::Decode(e.to_string()))
}

/// Turns an encoded image into a batch of one, shaped and scaled for the network.
pub fn prepare_input(
    image_data: &[u8],
    spec: &InputSpec,
) -> Result<Array<f32, Ix4>, ClassifierError> {
    let original_img = decode_image(image_data)?;
    Ok(image_to_tensor(&original_img, spec))
}

pub fn image_to_tensor(image: &DynamicImage, spec: &InputSpec) -> Array<f32, Ix4> {
    let size = spec.size;
    let img = image
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let side = size as usize;
    let mut input = match spec.layout {
        TensorLayout::Nhwc => Array::zeros((1, side, side, 3)),
        TensorLayout::Nchw => Array::zeros((1, 3, side, side)),
    };

    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        for (channel, value) in pixel.0.iter().enumerate() {
            let value = *value as f32 * spec.pixel_scale;
            match spec.layout {
                TensorLayout::Nhwc => input[[0, y, x, channel]] = value,
                TensorLayout::Nchw => input[[0, channel, y, x]] = value,
            }
        }
    }

    input
}
