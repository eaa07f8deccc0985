#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tds_explorer::config::Tables;
use tds_explorer::error::{AppError, Result};
use tds_explorer::queries::Templates;
use tds_explorer::startup::DashboardOptions;
use tds_explorer::warehouse::{ParamValue, Query, QueryGateway, Row, Value};
use tds_explorer::wordcloud::{EncodedImage, WordClouds};
use tds_explorer::AppState;

pub struct Article {
    pub title: &'static str,
    pub author: &'static str,
    pub claps: i64,
}

pub struct TagUse {
    pub tag: &'static str,
    pub year_month: &'static str,
    pub count: i64,
}

/// In-memory warehouse answering the dashboard's templates by name.
#[derive(Default)]
pub struct FixtureGateway {
    pub words: Vec<&'static str>,
    pub articles: Vec<Article>,
    pub tag_uses: Vec<TagUse>,
    failing: Mutex<HashSet<&'static str>>,
    seen: Mutex<Vec<Query>>,
}

impl FixtureGateway {
    pub fn sample() -> Self {
        let mut articles = vec![
            Article { title: "Pandas tricks", author: "Jane Doe", claps: 900 },
            Article { title: "SQL for analysts", author: "Jane Doe", claps: 450 },
            Article { title: "Robert'); DROP TABLE", author: "O'Brien", claps: 120 },
        ];
        for i in 0..12 {
            articles.push(Article {
                title: "Filler article",
                author: "Prolific Writer",
                claps: 100 + i * 10,
            });
        }

        FixtureGateway {
            words: vec!["data", "science", "data", "learning", "python", "data"],
            articles,
            tag_uses: vec![
                TagUse { tag: "python", year_month: "2019-02", count: 4 },
                TagUse { tag: "sql", year_month: "2019-01", count: 2 },
                TagUse { tag: "python", year_month: "2019-01", count: 7 },
                TagUse { tag: "statistics", year_month: "2019-01", count: 2 },
            ],
            ..Default::default()
        }
    }

    pub fn without_words(mut self) -> Self {
        self.words.clear();
        self
    }

    /// Makes every query with this template name fail with a connection error.
    pub fn fail(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    pub fn seen(&self) -> Vec<Query> {
        self.seen.lock().unwrap().clone()
    }

    fn top_articles(&self, query: &Query) -> Vec<Row> {
        let author = match query.param("author") {
            Some(ParamValue::String(a)) => Some(a.as_str()),
            _ => None,
        };
        let mut matching: Vec<&Article> = self
            .articles
            .iter()
            .filter(|a| author.is_none_or(|name| a.author == name))
            .collect();
        matching.sort_by(|a, b| b.claps.cmp(&a.claps));

        // Reverse the order so decoders cannot rely on warehouse ordering.
        matching
            .iter()
            .enumerate()
            .take(10)
            .rev()
            .map(|(i, a)| {
                Row::from_pairs([
                    ("Title", Value::String(a.title.to_string())),
                    ("Author", Value::String(a.author.to_string())),
                    ("Claps", Value::Int(a.claps)),
                    ("Responses", Value::Int(3)),
                    ("ReadingTime", Value::Float(4.5)),
                    ("Date", Value::String("2019-01-15".to_string())),
                    ("Id", Value::Int(i as i64 + 1)),
                ])
            })
            .collect()
    }

    fn tag_frequency(&self, query: &Query) -> Vec<Row> {
        let wanted = match query.param("tags") {
            Some(ParamValue::StringArray(tags)) => Some(tags.clone()),
            _ => None,
        };
        self.tag_uses
            .iter()
            .filter(|u| wanted.as_ref().is_none_or(|tags| tags.iter().any(|t| t == u.tag)))
            .map(|u| {
                Row::from_pairs([
                    ("Number", Value::Int(u.count)),
                    ("YearMonth", Value::String(u.year_month.to_string())),
                    ("Tag", Value::String(u.tag.to_string())),
                ])
            })
            .collect()
    }
}

#[async_trait]
impl QueryGateway for FixtureGateway {
    async fn run(&self, query: &Query) -> Result<Vec<Row>> {
        self.seen.lock().unwrap().push(query.clone());
        if self.failing.lock().unwrap().contains(query.name) {
            return Err(AppError::ConnectionError(format!("{} unavailable", query.name)));
        }

        let rows = match query.name {
            "words" => self
                .words
                .iter()
                .map(|w| Row::from_pairs([("Word", Value::String(w.to_string()))]))
                .collect(),
            "authors" => {
                let mut authors: Vec<&str> = self.articles.iter().map(|a| a.author).collect();
                authors.sort();
                authors.dedup();
                authors
                    .into_iter()
                    .map(|a| Row::from_pairs([("Author", Value::String(a.to_string()))]))
                    .collect()
            }
            "tags" => {
                let mut tags: Vec<&str> = self.tag_uses.iter().map(|u| u.tag).collect();
                tags.sort();
                tags.dedup();
                tags.into_iter()
                    .map(|t| Row::from_pairs([("Tag", Value::String(t.to_string()))]))
                    .collect()
            }
            "top_articles" => self.top_articles(query),
            "tag_frequency" => self.tag_frequency(query),
            other => return Err(AppError::QueryError(format!("unknown template {}", other))),
        };
        Ok(rows)
    }
}

pub fn templates() -> Templates {
    Templates::new(Tables {
        words: "tds-project.medium.words".into(),
        articles: "tds-project.medium.articles".into(),
        tags: "tds-project.medium.tags".into(),
    })
}

/// PNG-looking bytes, enough to tell the two clouds apart by their data URI.
pub fn tiny_png(marker: u8) -> EncodedImage {
    EncodedImage::png(&[0x89, b'P', b'N', b'G', marker])
}

pub fn options() -> DashboardOptions {
    DashboardOptions {
        authors: vec!["ALL".into(), "Jane Doe".into(), "O'Brien".into(), "Prolific Writer".into()],
        tags: vec!["python".into(), "sql".into(), "statistics".into()],
        word_clouds: WordClouds {
            top10: tiny_png(10),
            top100: tiny_png(100),
        },
        logo: None,
    }
}

pub fn app_state(gateway: Arc<FixtureGateway>) -> AppState {
    AppState {
        gateway,
        templates: Arc::new(templates()),
        options: Arc::new(options()),
    }
}

pub fn fixture_path(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .display()
        .to_string()
}
