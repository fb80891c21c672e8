//! Loss functions for pix2pix training
//!
//! The discriminator outputs probabilities, so the adversarial losses are
//! written directly as negative log likelihoods with a small epsilon.

use tch::{Kind, Tensor};

/// Keeps `ln` finite when a probability saturates
pub const EPS: f64 = 1e-12;

/// Discriminator loss: -(log(D(x, y)) + log(1 - D(x, G(x))))
///
/// # Arguments
///
/// * `predict_real` - Discriminator probabilities on real pairs
/// * `predict_fake` - Discriminator probabilities on generated pairs
///
/// # Returns
///
/// Scalar loss tensor
pub fn discriminator_loss(predict_real: &Tensor, predict_fake: &Tensor) -> Tensor {
    let real = (predict_real + EPS).log();
    let fake = (predict_fake.neg() + (1.0 + EPS)).log();
    (real + fake).neg().mean(Kind::Float)
}

/// Generator adversarial loss: -log(D(x, G(x)))
pub fn generator_gan_loss(predict_fake: &Tensor) -> Tensor {
    (predict_fake + EPS).log().neg().mean(Kind::Float)
}

/// Mean absolute error between target and output
pub fn l1_loss(target: &Tensor, output: &Tensor) -> Tensor {
    (target - output).abs().mean(Kind::Float)
}

/// Relative weights of the generator loss terms
#[derive(Debug, Clone, Copy)]
pub struct LossWeights {
    pub gan: f64,
    pub l1: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            gan: 1.0,
            l1: 100.0,
        }
    }
}

/// Generator loss terms of one step
pub struct GeneratorLoss {
    pub gan: Tensor,
    pub l1: Tensor,
    pub total: Tensor,
}

impl GeneratorLoss {
    /// Combine the adversarial and L1 terms
    pub fn compute(
        predict_fake: &Tensor,
        target: &Tensor,
        output: &Tensor,
        weights: LossWeights,
    ) -> Self {
        let gan = generator_gan_loss(predict_fake);
        let l1 = l1_loss(target, output);
        let total = &gan * weights.gan + &l1 * weights.l1;
        Self { gan, l1, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    fn full(value: f64) -> Tensor {
        Tensor::full([2, 1, 4, 4], value, (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_discriminator_loss() {
        let loss = discriminator_loss(&full(0.5), &full(0.5));

        assert_eq!(loss.size(), Vec::<i64>::new());
        assert!((loss.double_value(&[]) - 2.0 * std::f64::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_perfect_discriminator() {
        // Perfect discriminator: certain on real, certain on fake
        let loss = discriminator_loss(&full(1.0), &full(0.0));
        assert!(loss.double_value(&[]) < 1e-6);
    }

    #[test]
    fn test_saturated_predictions_stay_finite() {
        let loss = discriminator_loss(&full(0.0), &full(1.0));
        let value = loss.double_value(&[]);
        assert!(value.is_finite());
        assert!(value > 10.0);

        assert!(generator_gan_loss(&full(0.0)).double_value(&[]).is_finite());
    }

    #[test]
    fn test_generator_gan_loss() {
        let fooled = generator_gan_loss(&full(0.9)).double_value(&[]);
        let caught = generator_gan_loss(&full(0.1)).double_value(&[]);
        assert!(fooled < caught);
    }

    #[test]
    fn test_l1_loss() {
        let target = Tensor::from_slice(&[1.0f32, -1.0, 0.5, 0.0]);
        let output = Tensor::from_slice(&[0.0f32, -1.0, 0.0, 0.5]);
        assert!((l1_loss(&target, &output).double_value(&[]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_generator_loss_weights() {
        let target = Tensor::ones([1, 3, 4, 4], (Kind::Float, Device::Cpu));
        let output = Tensor::zeros([1, 3, 4, 4], (Kind::Float, Device::Cpu));
        let predict_fake = full(0.5);

        let loss = GeneratorLoss::compute(
            &predict_fake,
            &target,
            &output,
            LossWeights { gan: 2.0, l1: 10.0 },
        );

        let expected = 2.0 * std::f64::consts::LN_2 + 10.0;
        assert!((loss.total.double_value(&[]) - expected).abs() < 1e-4);
        assert!((loss.l1.double_value(&[]) - 1.0).abs() < 1e-6);
    }
}
