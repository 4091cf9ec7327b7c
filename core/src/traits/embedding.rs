use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}
