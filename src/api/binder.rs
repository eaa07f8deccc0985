//! Explicit binding table from output regions to the handler that fills them.
//!
//! Every handler is a function of one control value plus the read-only
//! application state, and always produces an artifact: failures are folded
//! into an error panel for that region alone.

use serde::Serialize;

use crate::api::models::{ControlValue, UpdateRequest, UpdateResponse};
use crate::charts::{self, Figure};
use crate::error::{AppError, Result};
use crate::queries::{self, AuthorFilter, TagFilter};
use crate::AppState;

pub const WORDS_CONTROL: &str = "dropdown_topwords";
pub const AUTHORS_CONTROL: &str = "dropdown_topauthors";
pub const TAGS_CONTROL: &str = "dropdown_toptags";

pub const WORDS_OUTPUT: &str = "dropdown_topwords_output";
pub const AUTHOR_LABEL_OUTPUT: &str = "dropdown_topauthors_output";
pub const AUTHOR_CHART_OUTPUT: &str = "plot_authors";
pub const TAG_CHART_OUTPUT: &str = "plot_tags";

pub const TOP10: &str = "TOP10";
pub const TOP100: &str = "TOP100";

const AUTHOR_CHART_TITLE: &str = "Contributions ordered by Claps";
const TAG_CHART_TITLE: &str = "Frequency of Tags used over the years";

/// A renderable result for one output region.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Image { src: String },
    Text { text: String },
    Figure { figure: Figure },
    Error { message: String, retryable: bool },
}

impl Artifact {
    fn from_error(err: &AppError) -> Self {
        Artifact::Error {
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    WordCloud,
    AuthorLabel,
    AuthorArticles,
    TagFrequency,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct Binding {
    pub output: &'static str,
    pub input: &'static str,
    #[serde(skip)]
    pub handler: Handler,
}

/// Both author bindings share a control and run independently of each other.
pub const BINDINGS: &[Binding] = &[
    Binding {
        output: WORDS_OUTPUT,
        input: WORDS_CONTROL,
        handler: Handler::WordCloud,
    },
    Binding {
        output: AUTHOR_LABEL_OUTPUT,
        input: AUTHORS_CONTROL,
        handler: Handler::AuthorLabel,
    },
    Binding {
        output: AUTHOR_CHART_OUTPUT,
        input: AUTHORS_CONTROL,
        handler: Handler::AuthorArticles,
    },
    Binding {
        output: TAG_CHART_OUTPUT,
        input: TAGS_CONTROL,
        handler: Handler::TagFrequency,
    },
];

pub fn binding_for(output: &str) -> Option<&'static Binding> {
    BINDINGS.iter().find(|b| b.output == output)
}

impl Handler {
    pub async fn invoke(self, state: &AppState, value: &ControlValue) -> Artifact {
        match self {
            Handler::WordCloud => word_cloud(state, value.single()),
            Handler::AuthorLabel => author_label(value.single()),
            Handler::AuthorArticles => {
                chart_artifact(author_articles(state, value.single()).await, AUTHOR_CHART_TITLE, 350)
            }
            Handler::TagFrequency => chart_artifact(tag_frequency(state, &value.list()).await, TAG_CHART_TITLE, 300),
        }
    }
}

fn chart_artifact(result: Result<Figure>, title: &str, height: u32) -> Artifact {
    match result {
        Ok(figure) => Artifact::Figure { figure },
        Err(AppError::RenderError(msg)) => {
            tracing::warn!(error = %msg, "Chart data unusable, showing empty chart");
            Artifact::Figure {
                figure: charts::empty_figure(title, height),
            }
        }
        Err(err) => Artifact::from_error(&err),
    }
}

/// `TOP10` selects the ten-word cloud; anything else the hundred-word one.
pub fn word_cloud(state: &AppState, value: &str) -> Artifact {
    let clouds = &state.options.word_clouds;
    let image = if value == TOP10 { &clouds.top10 } else { &clouds.top100 };
    Artifact::Image { src: image.data_uri() }
}

pub fn author_label(author: &str) -> Artifact {
    Artifact::Text {
        text: format!("Top Article(s) from {}", author),
    }
}

pub async fn author_articles(state: &AppState, author: &str) -> Result<Figure> {
    let query = state.templates.top_articles(&AuthorFilter::from_value(author));
    let rows = state.gateway.run(&query).await?;
    let articles = queries::decode_articles(&rows)?;
    charts::article_bar_chart(&articles)
}

pub async fn tag_frequency(state: &AppState, tags: &[String]) -> Result<Figure> {
    let filter = TagFilter::from_values(tags);
    let query = state.templates.tag_frequency(&filter);
    let rows = state.gateway.run(&query).await?;
    let freq = queries::decode_tag_frequency(&rows, &filter)?;
    charts::tag_bubble_chart(&freq)
}

/// Runs the handler bound to the requested output region.
pub async fn dispatch(state: &AppState, req: &UpdateRequest) -> Result<UpdateResponse> {
    let binding = binding_for(&req.output).ok_or_else(|| AppError::UnknownOutput(req.output.clone()))?;

    let artifact = binding.handler.invoke(state, &req.value).await;
    if let Artifact::Error { message, .. } = &artifact {
        tracing::warn!(output = binding.output, seq = req.seq, error = %message, "Region update failed");
    } else {
        tracing::debug!(output = binding.output, seq = req.seq, "Region updated");
    }

    Ok(UpdateResponse {
        output: binding.output.to_string(),
        seq: req.seq,
        artifact,
    })
}
