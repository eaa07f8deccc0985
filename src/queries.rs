//! Fixed query templates and decoding of their result rows.
//!
//! User-supplied values only ever travel as bound parameters; the SQL text
//! of every template is constant apart from the configured table names.

use serde::Serialize;

use crate::config::Tables;
use crate::error::Result;
use crate::warehouse::{ParamValue, Query, Row};

/// Sentinel meaning "no filter" for the author and tag controls.
pub const ALL: &str = "ALL";
pub const TOP_ARTICLES: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorFilter {
    All,
    Author(String),
}

impl AuthorFilter {
    pub fn from_value(value: &str) -> Self {
        if value == ALL || value.is_empty() {
            AuthorFilter::All
        } else {
            AuthorFilter::Author(value.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagFilter {
    All,
    Tags(Vec<String>),
}

impl TagFilter {
    /// An empty selection, or one containing the `ALL` sentinel, means every tag.
    pub fn from_values(values: &[String]) -> Self {
        let tags: Vec<String> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();

        if tags.is_empty() || tags.iter().any(|t| t == ALL) {
            TagFilter::All
        } else {
            TagFilter::Tags(tags)
        }
    }

    pub fn allows(&self, tag: &str) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::Tags(tags) => tags.iter().any(|t| t == tag),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArticleRow {
    pub title: String,
    pub author: String,
    pub claps: i64,
    pub responses: i64,
    pub reading_time: f64,
    pub date: String,
    pub rank: i64,
}

impl ArticleRow {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(ArticleRow {
            title: row.string("Title")?,
            author: row.string("Author")?,
            claps: row.int("Claps")?,
            responses: row.int("Responses")?,
            reading_time: row.float("ReadingTime")?,
            date: row.string("Date")?,
            rank: row.int("Id")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagFrequencyRow {
    pub tag: String,
    pub year_month: String,
    pub count: i64,
}

impl TagFrequencyRow {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(TagFrequencyRow {
            tag: row.string("Tag")?,
            year_month: row.string("YearMonth")?,
            count: row.int("Number")?,
        })
    }
}

/// Builds every query the dashboard issues against the configured tables.
#[derive(Clone, Debug)]
pub struct Templates {
    tables: Tables,
}

impl Templates {
    pub fn new(tables: Tables) -> Self {
        Templates { tables }
    }

    pub fn words(&self, limit: i64) -> Query {
        Query::new(
            "words",
            format!("SELECT Word FROM `{}` LIMIT @limit", self.tables.words),
        )
        .bind("limit", ParamValue::Int64(limit))
    }

    pub fn authors(&self) -> Query {
        Query::new(
            "authors",
            format!(
                "SELECT DISTINCT Author FROM `{}` WHERE Author IS NOT NULL ORDER BY Author",
                self.tables.articles
            ),
        )
    }

    pub fn tags(&self) -> Query {
        Query::new(
            "tags",
            format!(
                "SELECT DISTINCT TS.Tag AS Tag \
                 FROM `{}` AS AM \
                 INNER JOIN `{}` AS TS ON AM.ID = TS.ID \
                 ORDER BY Tag",
                self.tables.articles, self.tables.tags
            ),
        )
    }

    pub fn top_articles(&self, filter: &AuthorFilter) -> Query {
        let filter_clause = match filter {
            AuthorFilter::All => "",
            AuthorFilter::Author(_) => "WHERE Author = @author ",
        };
        let query = Query::new(
            "top_articles",
            format!(
                "SELECT Title, Author, Claps, No_Responses AS Responses, Reading_time AS ReadingTime, \
                 PublishingDate AS Date, ROW_NUMBER() OVER (ORDER BY Claps DESC) AS Id \
                 FROM `{}` \
                 {}ORDER BY Claps DESC LIMIT @limit",
                self.tables.articles, filter_clause
            ),
        )
        .bind("limit", ParamValue::Int64(TOP_ARTICLES as i64));

        match filter {
            AuthorFilter::All => query,
            AuthorFilter::Author(author) => query.bind("author", ParamValue::String(author.clone())),
        }
    }

    pub fn tag_frequency(&self, filter: &TagFilter) -> Query {
        let filter_clause = match filter {
            TagFilter::All => "",
            TagFilter::Tags(_) => "WHERE TS.Tag IN UNNEST(@tags) ",
        };
        let query = Query::new(
            "tag_frequency",
            format!(
                "SELECT COUNT(TS.Tag) AS Number, \
                 FORMAT_DATE('%Y-%m', DATE(AM.PublishingDate)) AS YearMonth, \
                 TS.Tag AS Tag \
                 FROM `{}` AS AM \
                 INNER JOIN `{}` AS TS ON AM.ID = TS.ID \
                 {}GROUP BY Tag, YearMonth \
                 ORDER BY YearMonth, Number DESC",
                self.tables.articles, self.tables.tags, filter_clause
            ),
        );

        match filter {
            TagFilter::All => query,
            TagFilter::Tags(tags) => query.bind("tags", ParamValue::StringArray(tags.clone())),
        }
    }
}

pub fn decode_words(rows: &[Row]) -> Result<Vec<String>> {
    rows.iter().map(|row| row.string("Word")).collect()
}

/// Distinct authors with the `ALL` sentinel first.
pub fn decode_authors(rows: &[Row]) -> Result<Vec<String>> {
    let mut authors = vec![ALL.to_string()];
    for row in rows {
        let author = row.string("Author")?;
        if !author.is_empty() && !authors.contains(&author) {
            authors.push(author);
        }
    }
    Ok(authors)
}

pub fn decode_tags(rows: &[Row]) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(rows.len());
    for row in rows {
        let tag = row.string("Tag")?;
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// At most ten articles, rank ascending.
pub fn decode_articles(rows: &[Row]) -> Result<Vec<ArticleRow>> {
    let mut articles = rows.iter().map(ArticleRow::from_row).collect::<Result<Vec<_>>>()?;
    articles.sort_by_key(|a| a.rank);
    articles.truncate(TOP_ARTICLES);
    Ok(articles)
}

/// Rows restricted to the filter, by month ascending then count descending.
pub fn decode_tag_frequency(rows: &[Row], filter: &TagFilter) -> Result<Vec<TagFrequencyRow>> {
    let mut freq = rows
        .iter()
        .map(TagFrequencyRow::from_row)
        .collect::<Result<Vec<_>>>()?;
    freq.retain(|r| filter.allows(&r.tag));
    freq.sort_by(|a, b| {
        a.year_month
            .cmp(&b.year_month)
            .then(b.count.cmp(&a.count))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    Ok(freq)
}
