//! One-shot initialization: option sets, word clouds and the logo.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::queries::{self, Templates};
use crate::warehouse::QueryGateway;
use crate::wordcloud::{self, EncodedImage, WordClouds};

pub const LOGO_FILE: &str = "dash-logo-new.png";

/// Immutable dashboard configuration built once at startup and shared
/// read-only with the page renderer and every handler.
#[derive(Clone, Debug)]
pub struct DashboardOptions {
    /// Distinct authors, `ALL` first.
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub word_clouds: WordClouds,
    pub logo: Option<EncodedImage>,
}

pub struct Bootstrap<'a> {
    pub gateway: &'a dyn QueryGateway,
    pub templates: &'a Templates,
    pub word_limit: i64,
    pub img_dir: &'a Path,
}

impl Bootstrap<'_> {
    /// Loads everything the dashboard needs. Any error here is fatal.
    pub async fn run(self) -> Result<DashboardOptions> {
        tracing::info!("Loading word list");
        let rows = self.gateway.run(&self.templates.words(self.word_limit)).await?;
        let words = queries::decode_words(&rows)?;

        let img_dir: PathBuf = self.img_dir.to_path_buf();
        let word_clouds = tokio::task::spawn_blocking(move || wordcloud::generate_all(&words, &img_dir))
            .await
            .map_err(|e| AppError::ImageError(format!("word cloud task failed: {}", e)))??;

        tracing::info!("Loading authors");
        let rows = self.gateway.run(&self.templates.authors()).await?;
        let authors = queries::decode_authors(&rows)?;

        tracing::info!("Loading tags");
        let rows = self.gateway.run(&self.templates.tags()).await?;
        let tags = queries::decode_tags(&rows)?;

        let logo_path = self.img_dir.join(LOGO_FILE);
        let logo = match EncodedImage::from_file(&logo_path) {
            Ok(logo) => Some(logo),
            Err(err) => {
                tracing::warn!(path = %logo_path.display(), error = %err, "Logo unavailable, banner renders without it");
                None
            }
        };

        tracing::info!(authors = authors.len() - 1, tags = tags.len(), "Dashboard options loaded");

        Ok(DashboardOptions {
            authors,
            tags,
            word_clouds,
            logo,
        })
    }
}
