use candle_core::{DType, Device, Tensor};
use docstore_embed::masked_mean_l2;

fn close(a: &[f32], b: &[f32]) -> bool { a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5) }

#[test]
fn padding_tokens_do_not_contribute() {
    let dev = Device::Cpu;
    // Batch of two, three tokens, hidden 2. Row 0 keeps tokens 0 and 1; row 1 keeps only token 2.
    let hidden = Tensor::from_slice(
        &[3.0f32, 0.0, 1.0, 4.0, 100.0, 100.0, /* row 1 */ 9.0, 9.0, 9.0, 9.0, 0.0, 2.0],
        (2, 3, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 0, 0, 0, 1], (2, 3), &dev).unwrap();
    let rows: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask).unwrap().to_vec2().unwrap();

    // Row 0: mean of (3,0) and (1,4) is (2,2), normalized to (1/sqrt2, 1/sqrt2).
    let h = std::f32::consts::FRAC_1_SQRT_2;
    assert!(close(&rows[0], &[h, h]), "row 0 = {:?}", rows[0]);
    // Row 1: only (0,2) survives.
    assert!(close(&rows[1], &[0.0, 1.0]), "row 1 = {:?}", rows[1]);
}

#[test]
fn fully_masked_row_is_zero_not_nan() {
    let dev = Device::Cpu;
    let hidden = Tensor::ones((1, 2, 3), DType::F32, &dev).unwrap();
    let mask = Tensor::zeros((1, 2), DType::U32, &dev).unwrap();
    let rows: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask).unwrap().to_vec2().unwrap();
    assert!(rows[0].iter().all(|x| *x == 0.0));
}

#[test]
fn rejects_wrong_ranks() {
    let dev = Device::Cpu;
    let flat = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2, 4), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&flat, &mask).is_err());

    let hidden = Tensor::zeros((2, 4, 8), DType::F32, &dev).unwrap();
    let short_mask = Tensor::ones((2, 3), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&hidden, &short_mask).is_err());
}
