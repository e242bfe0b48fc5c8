//! # `ResNet` Utilities
use bimm_contracts::{ShapeContract, shape_contract};

/// Supported backbone output strides.
pub const RESNET_OUTPUT_STRIDES: [usize; 3] = [8, 16, 32];

/// Get the output resolution for a given input resolution.
///
/// The input must be a multiple of the stride.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in=height_out*stride, width_in=width_out*stride]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
///
/// # Panics
///
/// If the input resolution is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    static INPUT_CONTRACT: ShapeContract = shape_contract![
        "height_in" = "height_out" * "stride",
        "width_in" = "width_out" * "stride",
    ];
    INPUT_CONTRACT.unpack_shape(
        &input_resolution,
        &["height_out", "width_out"],
        &[("stride", stride)],
    )
}

/// Per-layer ``(stride, dilation)`` reaching a target output stride.
///
/// The ``conv1`` / ``maxpool`` stem contributes a fixed stride of 4;
/// layers past the target trade their stride for dilation.
///
/// # Returns
///
/// `None` for unsupported output strides.
pub fn layer_stride_schedule(output_stride: usize) -> Option<[(usize, usize); 4]> {
    match output_stride {
        32 => Some([(1, 1), (2, 1), (2, 1), (2, 1)]),
        16 => Some([(1, 1), (2, 1), (2, 1), (1, 2)]),
        8 => Some([(1, 1), (2, 1), (1, 2), (1, 4)]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_div_output_resolution() {
        assert_eq!(stride_div_output_resolution([32, 64], 8), [4, 8]);
    }

    #[test]
    #[should_panic]
    fn test_stride_div_output_resolution_uneven() {
        stride_div_output_resolution([30, 64], 8);
    }

    #[test]
    fn test_layer_stride_schedule() {
        for output_stride in RESNET_OUTPUT_STRIDES {
            let schedule = layer_stride_schedule(output_stride).unwrap();
            let stride: usize = 4 * schedule.iter().map(|(s, _)| s).product::<usize>();
            assert_eq!(stride, output_stride);
        }
        assert!(layer_stride_schedule(4).is_none());
    }
}
