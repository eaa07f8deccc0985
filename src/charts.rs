//! Plotly figure specifications for the two chart regions.
//!
//! Figures are plain data; plotly.js draws them in the browser.

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::queries::{ArticleRow, TagFrequencyRow};

pub const BAR_COLOR: &str = "rgb(53, 88, 118)";
pub const BACKGROUND: &str = "rgb(255, 255, 255)";
pub const GRID_COLOR: &str = "rgb(238, 238, 238)";
// Plotly's default qualitative sequence.
const TAG_COLORS: &[&str] = &[
    "#636efa", "#EF553B", "#00cc96", "#ab63fa", "#FFA15A", "#19d3f3", "#FF6692", "#B6E880", "#FF97FF", "#FECB52",
];
const MAX_BUBBLE_PX: f64 = 20.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    pub x: Vec<serde_json::Value>,
    pub y: Vec<serde_json::Value>,
    pub marker: Marker,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customdata: Option<Vec<Vec<serde_json::Value>>>,
    pub hovertemplate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizemode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizeref: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizemin: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xanchor: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yanchor: Option<&'static str>,
}

impl Title {
    fn centered(text: &str) -> Self {
        Title {
            text: text.to_string(),
            x: Some(0.5),
            y: Some(0.9),
            xanchor: Some("center"),
            yanchor: Some("top"),
        }
    }

    fn plain(text: &str) -> Self {
        Title {
            text: text.to_string(),
            x: None,
            y: None,
            xanchor: None,
            yanchor: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Axis {
    pub title: Title,
    pub showgrid: bool,
    pub gridwidth: u32,
    pub gridcolor: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zerolinecolor: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linecolor: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl Axis {
    fn grid(title: &str) -> Self {
        Axis {
            title: Title::plain(title),
            showgrid: true,
            gridwidth: 1,
            gridcolor: GRID_COLOR,
            zerolinecolor: None,
            linecolor: None,
            range: None,
            visible: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub text: String,
    pub showarrow: bool,
    pub xref: &'static str,
    pub yref: &'static str,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Legend {
    pub title: Title,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    pub title: Title,
    pub height: u32,
    pub plot_bgcolor: &'static str,
    pub paper_bgcolor: &'static str,
    pub xaxis: Axis,
    pub yaxis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showlegend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Layout {
    fn styled(title: &str, height: u32, xaxis: Axis, yaxis: Axis) -> Self {
        Layout {
            title: Title::centered(title),
            height,
            plot_bgcolor: BACKGROUND,
            paper_bgcolor: BACKGROUND,
            xaxis,
            yaxis,
            showlegend: None,
            legend: None,
            annotations: Vec::new(),
        }
    }

    fn with_empty_notice(mut self) -> Self {
        self.annotations.push(Annotation {
            text: "No data to display".to_string(),
            showarrow: false,
            xref: "paper",
            yref: "paper",
            x: 0.5,
            y: 0.5,
        });
        self
    }
}

/// Ranked bar chart of the most-clapped articles.
pub fn article_bar_chart(articles: &[ArticleRow]) -> Result<Figure> {
    for a in articles {
        if a.claps < 0 {
            return Err(AppError::RenderError(format!("negative clap count for {:?}", a.title)));
        }
    }

    let mut xaxis = Axis::grid("Article");
    xaxis.range = Some([1.0, 10.0]);
    xaxis.zerolinecolor = Some(GRID_COLOR);
    let mut yaxis = Axis::grid("Claps");
    yaxis.zerolinecolor = Some(GRID_COLOR);

    let mut layout = Layout::styled("Contributions ordered by Claps", 350, xaxis, yaxis);
    if articles.is_empty() {
        layout = layout.with_empty_notice();
    }

    let trace = Trace {
        kind: "bar",
        name: None,
        mode: None,
        x: articles.iter().map(|a| a.rank.into()).collect(),
        y: articles.iter().map(|a| a.claps.into()).collect(),
        marker: Marker {
            color: BAR_COLOR.to_string(),
            size: None,
            sizemode: None,
            sizeref: None,
            sizemin: None,
        },
        customdata: Some(
            articles
                .iter()
                .map(|a| {
                    vec![
                        a.title.clone().into(),
                        a.author.clone().into(),
                        a.responses.into(),
                        serde_json::json!(a.reading_time),
                        a.date.clone().into(),
                    ]
                })
                .collect(),
        ),
        hovertemplate: "Article=%{x}<br>Claps=%{y}<br>Title=%{customdata[0]}<br>Author=%{customdata[1]}\
                        <br>Responses=%{customdata[2]}<br>ReadingTime=%{customdata[3]}<br>Date=%{customdata[4]}\
                        <extra></extra>"
            .to_string(),
        showlegend: None,
    };

    Ok(Figure {
        data: vec![trace],
        layout,
    })
}

/// Bubble chart of tag usage per month, one trace per tag.
pub fn tag_bubble_chart(rows: &[TagFrequencyRow]) -> Result<Figure> {
    for r in rows {
        if r.count < 0 {
            return Err(AppError::RenderError(format!("negative count for tag {:?}", r.tag)));
        }
    }

    let mut tags: Vec<&str> = Vec::new();
    for r in rows {
        if !tags.contains(&r.tag.as_str()) {
            tags.push(&r.tag);
        }
    }

    // Area sizing, as plotly express does it.
    let max_count = rows.iter().map(|r| r.count).max().unwrap_or(0).max(1) as f64;
    let sizeref = 2.0 * max_count / (MAX_BUBBLE_PX * MAX_BUBBLE_PX);

    let data = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| {
            let series: Vec<&TagFrequencyRow> = rows.iter().filter(|r| r.tag == *tag).collect();
            Trace {
                kind: "scatter",
                name: Some(tag.to_string()),
                mode: Some("markers"),
                x: series.iter().map(|r| r.year_month.clone().into()).collect(),
                y: series.iter().map(|r| r.count.into()).collect(),
                marker: Marker {
                    color: TAG_COLORS[i % TAG_COLORS.len()].to_string(),
                    size: Some(series.iter().map(|r| r.count as f64).collect()),
                    sizemode: Some("area"),
                    sizeref: Some(sizeref),
                    sizemin: Some(4.0),
                },
                customdata: Some(series.iter().map(|r| vec![r.tag.clone().into()]).collect()),
                hovertemplate: "Tag=%{customdata[0]}<br>Month/Year=%{x}<br>Frequency of Tag=%{y}<extra></extra>"
                    .to_string(),
                showlegend: Some(true),
            }
        })
        .collect();

    let mut xaxis = Axis::grid("Month/Year");
    xaxis.linecolor = Some(GRID_COLOR);
    let yaxis = Axis::grid("Frequency of Tag");

    let mut layout = Layout::styled("Frequency of Tags used over the years", 300, xaxis, yaxis);
    layout.showlegend = Some(true);
    layout.legend = Some(Legend {
        title: Title::plain("Tag"),
    });
    if rows.is_empty() {
        layout = layout.with_empty_notice();
    }

    Ok(Figure { data, layout })
}

/// Fallback figure shown when a chart cannot be built at all.
pub fn empty_figure(title: &str, height: u32) -> Figure {
    Figure {
        data: Vec::new(),
        layout: Layout::styled(title, height, Axis::grid(""), Axis::grid("")).with_empty_notice(),
    }
}
