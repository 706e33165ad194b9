// ============================================================
// Layer 5 — Embedding Network
// ============================================================
// A fully-connected embedding model for face images: flatten the
// pixels, pass them through the architecture's hidden stack with
// ReLU activations, project to the embedding dimension, and
// L2-normalise each row so every embedding lies on the unit
// hypersphere. Distances between normalised embeddings are then
// bounded and comparable across batches.
//
// The Embedder trait is the seam between the executor and any
// concrete model: embedding either succeeds with a tensor or
// reports that the device could not complete the attempt. The
// outcome is an ordinary value, so callers decide what recovery
// means — no panics cross this boundary.
//
// Reference: Schroff et al. (2015) - FaceNet paper
//            Burn Book §3 (Modules)

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

use crate::domain::execution::Architecture;

// ─── Embedder ─────────────────────────────────────────────────────────────────
/// Outcome of one embedding attempt. `Exhausted` means the device
/// could not service the batch; it is a recoverable signal, not a
/// failure of the model itself.
#[derive(Debug)]
pub enum EmbedOutcome<B: Backend> {
    /// Embeddings of shape [n, embedding_dim], L2-normalised rows
    Embeddings(Tensor<B, 2>),
    /// The device refused the batch (e.g. out of memory)
    Exhausted,
}

/// Anything that can map a batch of images to embeddings.
pub trait Embedder<B: Backend> {
    /// Embed `images` of shape [n, channels, height, width] into
    /// [n, embedding_dim], or report exhaustion.
    fn embed(&self, images: Tensor<B, 4>) -> EmbedOutcome<B>;

    /// Width of the embedding each row carries
    fn embedding_dim(&self) -> usize;
}

// ─── EmbeddingNetConfig ───────────────────────────────────────────────────────
/// Configuration for the embedding network.
#[derive(Config, Debug)]
pub struct EmbeddingNetConfig {
    /// Which hidden stack to build
    pub architecture: Architecture,

    /// Input image side length (images are square)
    #[config(default = 64)]
    pub image_size: usize,

    /// Colour channels per image
    #[config(default = 3)]
    pub channels: usize,

    /// Output embedding width
    #[config(default = 128)]
    pub embedding_dim: usize,
}

impl EmbeddingNetConfig {
    /// Initialise the network with random weights on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingNet<B> {
        let input_dim = self.channels * self.image_size * self.image_size;

        let mut hidden = Vec::new();
        let mut in_dim = input_dim;
        for &out_dim in self.architecture.hidden_dims() {
            hidden.push(LinearConfig::new(in_dim, out_dim).init(device));
            in_dim = out_dim;
        }

        EmbeddingNet {
            hidden,
            output: LinearConfig::new(in_dim, self.embedding_dim).init(device),
            embedding_dim: self.embedding_dim,
        }
    }
}

// ─── EmbeddingNet ─────────────────────────────────────────────────────────────
/// The embedding network itself. Hidden layers follow the chosen
/// architecture; the output layer projects to the embedding space.
#[derive(Module, Debug)]
pub struct EmbeddingNet<B: Backend> {
    /// Hidden fully-connected layers, applied in order with ReLU
    hidden: Vec<Linear<B>>,
    /// Final projection to the embedding dimension
    output: Linear<B>,
    /// Embedding width, kept for callers that need it
    embedding_dim: usize,
}

impl<B: Backend> EmbeddingNet<B> {
    /// Forward pass: [n, C, H, W] → [n, embedding_dim], rows unit-norm.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [n, c, h, w] = images.dims();
        let mut x = images.reshape([n, c * h * w]);

        for layer in &self.hidden {
            x = activation::relu(layer.forward(x));
        }
        let x = self.output.forward(x);

        // L2-normalise each row; clamp avoids division by zero for
        // a degenerate all-zero embedding
        let norms = x.clone().powf_scalar(2.0).sum_dim(1).sqrt().clamp_min(1e-12);
        x.div(norms)
    }
}

impl<B: Backend> Embedder<B> for EmbeddingNet<B> {
    fn embed(&self, images: Tensor<B, 4>) -> EmbedOutcome<B> {
        EmbedOutcome::Embeddings(self.forward(images))
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> EmbeddingNetConfig {
        EmbeddingNetConfig::new(Architecture::Compact)
            .with_image_size(8)
            .with_channels(1)
            .with_embedding_dim(16)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([5, 1, 8, 8], &device);
        let embeddings = model.forward(images);
        assert_eq!(embeddings.dims(), [5, 16]);
    }

    #[test]
    fn test_rows_are_unit_norm() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random(
            [4, 1, 8, 8],
            burn::tensor::Distribution::Default,
            &device,
        );
        let embeddings = model.forward(images);
        let norms = embeddings
            .powf_scalar(2.0)
            .sum_dim(1)
            .sqrt()
            .to_data()
            .to_vec::<f32>()
            .unwrap();
        for norm in norms {
            assert!((norm - 1.0).abs() < 1e-4, "row norm was {norm}");
        }
    }

    #[test]
    fn test_embed_reports_embeddings() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 1, 8, 8], &device);
        match model.embed(images) {
            EmbedOutcome::Embeddings(e) => assert_eq!(e.dims(), [2, 16]),
            EmbedOutcome::Exhausted => panic!("embedding should succeed on the test backend"),
        }
    }
}
