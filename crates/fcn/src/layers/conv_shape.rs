//! # Convolution Shape Arithmetic
//!
//! Output size prediction for the convolution and pooling stages used
//! by the FCN backbones, and for the transposed convolutions used to
//! upsample score maps.

/// Predict the output size of a 1D convolution (or pooling) window.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride) + 1 )
/// ```
///
/// # Arguments
///
/// - `input_size`: The input dimension size, must be > 0.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the window, must be > 0.
/// - `padding`: The padding, added evenly to both sides of the input.
/// - `dilation`: The dilation of the kernel, must be > 0.
///
/// # Returns
///
/// `Some(out_size)`; or `None` when the window does not fit.
pub fn maybe_conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    let padded = input_size + 2 * padding;
    let kernel_span = 1 + dilation * (kernel_size - 1);

    if padded < kernel_span {
        return None;
    }
    Some((padded - kernel_span) / stride + 1)
}

/// Predict the output size of a 1D convolution (or pooling) window.
///
/// This is the ``panic``-ing variant of [`maybe_conv_output_size`].
///
/// # Panics
///
/// If the window does not fit the padded input.
pub fn expect_conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    match maybe_conv_output_size(input_size, kernel_size, stride, padding, dilation) {
        Some(x) => x,
        None => panic!(
            "No legal output size for conv with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n dilation:{dilation}\n padding:{padding}",
        ),
    }
}

/// Predict the output resolution of a square 2D window over a ``[height, width]`` input.
///
/// # Returns
///
/// `Some([out_height, out_width])`; or `None` when the window does not fit.
pub fn maybe_conv2d_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<[usize; 2]> {
    let [height, width] = input_resolution;
    Some([
        maybe_conv_output_size(height, kernel_size, stride, padding, dilation)?,
        maybe_conv_output_size(width, kernel_size, stride, padding, dilation)?,
    ])
}

/// Predict the output size of a 1D transposed convolution.
///
/// ```text
/// out_size = (in_size - 1)*stride - 2*padding + dilation*(kernel_size - 1) + padding_out + 1
/// ```
///
/// # Panics
///
/// If the padding removes the entire output.
pub fn transpose_conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    padding_out: usize,
    dilation: usize,
) -> usize {
    let full = (input_size - 1) * stride + dilation * (kernel_size - 1) + padding_out + 1;
    assert!(
        full > 2 * padding,
        "padding {padding} consumes transpose conv output of size {full}"
    );
    full - 2 * padding
}

/// Round `value` up to the next multiple of `multiple`.
pub fn round_up_to_multiple(
    value: usize,
    multiple: usize,
) -> usize {
    assert!(multiple > 0, "multiple must be > 0");
    value.div_ceil(multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_output_size() {
        fn reference(
            input_size: usize,
            kernel_size: usize,
            stride: usize,
            padding: usize,
            dilation: usize,
        ) -> Option<usize> {
            let padded = (input_size + 2 * padding) as f64;
            let kernel_span = 1.0 + dilation as f64 * (kernel_size as f64 - 1.0);

            let x = (((padded - kernel_span) / stride as f64) + 1.0).floor();
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_size in 1..12 {
            for stride in 1..4 {
                for kernel_size in 1..5 {
                    for dilation in 1..3 {
                        for padding in 0..4 {
                            assert_eq!(
                                maybe_conv_output_size(
                                    input_size,
                                    kernel_size,
                                    stride,
                                    padding,
                                    dilation
                                ),
                                reference(input_size, kernel_size, stride, padding, dilation),
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_alexnet_stem_arithmetic() {
        // conv 11x11/4, pad 2; then maxpool 3x3/2.
        let x = expect_conv_output_size(224, 11, 4, 2, 1);
        assert_eq!(x, 55);
        assert_eq!(expect_conv_output_size(x, 3, 2, 0, 1), 27);

        assert_eq!(
            maybe_conv2d_output_resolution([64, 32], 11, 4, 2, 1),
            Some([15, 7])
        );
        assert_eq!(maybe_conv2d_output_resolution([4, 4], 11, 4, 2, 1), None);
    }

    #[test]
    #[should_panic(expected = "No legal output size")]
    fn test_expect_conv_output_size_panics() {
        expect_conv_output_size(2, 7, 1, 0, 1);
    }

    #[test]
    fn test_transpose_conv_output_size() {
        // The FCN upsample geometry: kernel 2f, stride f, padding f/2.
        for factor in [2, 4, 8, 16, 32] {
            for input_size in 1..9 {
                assert_eq!(
                    transpose_conv_output_size(input_size, 2 * factor, factor, factor / 2, 0, 1),
                    input_size * factor
                );
            }
        }
    }

    #[test]
    fn test_round_up_to_multiple() {
        assert_eq!(round_up_to_multiple(1, 32), 32);
        assert_eq!(round_up_to_multiple(32, 32), 32);
        assert_eq!(round_up_to_multiple(33, 32), 64);
        assert_eq!(round_up_to_multiple(7, 1), 7);
    }
}
