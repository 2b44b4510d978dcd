//! MCP `search_observations` and `search_summaries` tool parameter definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::records::{DateRange, OrderBy, SearchFilters, SearchOptions};

/// Parameters for the `search_observations` MCP tool.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchObservationsParams {
    #[schemars(description = "Optional keyword query matched against the full-text index")]
    pub query: Option<String>,

    #[schemars(
        description = "Project to search. Records stored under the project's older names are included. Defaults to the current project."
    )]
    pub project: Option<String>,

    #[schemars(
        description = "Observation types to include: decision, bugfix, feature, refactor, discovery, change"
    )]
    pub types: Option<Vec<String>>,

    #[schemars(description = "Only observations tagged with any of these concepts")]
    pub concepts: Option<Vec<String>>,

    #[schemars(description = "Only observations that read or modified any of these files")]
    pub files: Option<Vec<String>>,

    #[schemars(description = "Earliest creation time, epoch milliseconds (inclusive)")]
    pub date_start: Option<i64>,

    #[schemars(description = "Latest creation time, epoch milliseconds (inclusive)")]
    pub date_end: Option<i64>,

    #[schemars(description = "Ordering: 'date_desc' (default), 'date_asc' or 'relevance' (needs query)")]
    pub order_by: Option<String>,

    #[schemars(description = "Maximum number of results")]
    pub limit: Option<usize>,

    #[schemars(description = "Number of results to skip")]
    pub offset: Option<usize>,
}

/// Parameters for the `search_summaries` MCP tool.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchSummariesParams {
    #[schemars(description = "Optional keyword query matched against the full-text index")]
    pub query: Option<String>,

    #[schemars(description = "Project to search. Defaults to the current project.")]
    pub project: Option<String>,

    #[schemars(description = "Only summaries that read or edited any of these files")]
    pub files: Option<Vec<String>>,

    #[schemars(description = "Earliest creation time, epoch milliseconds (inclusive)")]
    pub date_start: Option<i64>,

    #[schemars(description = "Latest creation time, epoch milliseconds (inclusive)")]
    pub date_end: Option<i64>,

    #[schemars(description = "Ordering: 'date_desc' (default), 'date_asc' or 'relevance' (needs query)")]
    pub order_by: Option<String>,

    #[schemars(description = "Maximum number of results")]
    pub limit: Option<usize>,

    #[schemars(description = "Number of results to skip")]
    pub offset: Option<usize>,
}

impl SearchObservationsParams {
    pub fn into_options(self, default_project: Option<&str>) -> Result<SearchOptions, StoreError> {
        build_options(
            SearchFilters {
                project: self.project.or_else(|| default_project.map(str::to_string)),
                types: self.types.unwrap_or_default(),
                date_range: date_range(self.date_start, self.date_end),
                concepts: self.concepts.unwrap_or_default(),
                files: self.files.unwrap_or_default(),
            },
            self.query,
            self.order_by.as_deref(),
            self.limit,
            self.offset,
        )
    }
}

impl SearchSummariesParams {
    pub fn into_options(self, default_project: Option<&str>) -> Result<SearchOptions, StoreError> {
        build_options(
            SearchFilters {
                project: self.project.or_else(|| default_project.map(str::to_string)),
                date_range: date_range(self.date_start, self.date_end),
                files: self.files.unwrap_or_default(),
                ..SearchFilters::default()
            },
            self.query,
            self.order_by.as_deref(),
            self.limit,
            self.offset,
        )
    }
}

fn date_range(start: Option<i64>, end: Option<i64>) -> Option<DateRange> {
    (start.is_some() || end.is_some()).then_some(DateRange { start, end })
}

fn build_options(
    filters: SearchFilters,
    query: Option<String>,
    order_by: Option<&str>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> Result<SearchOptions, StoreError> {
    Ok(SearchOptions {
        filters,
        limit,
        offset: offset.unwrap_or(0),
        order_by: order_by.map(str::parse::<OrderBy>).transpose()?.unwrap_or_default(),
        query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_project_fills_in_when_omitted() {
        let params = SearchObservationsParams {
            types: Some(vec!["bugfix".into()]),
            date_end: Some(10),
            ..Default::default()
        };
        let options = params.into_options(Some("github.com/acme/mnemo")).unwrap();
        assert_eq!(options.filters.project.as_deref(), Some("github.com/acme/mnemo"));
        assert_eq!(options.filters.types, vec!["bugfix"]);
        assert_eq!(options.filters.date_range, Some(DateRange { start: None, end: Some(10) }));
        assert_eq!(options.order_by, OrderBy::DateDesc);

        let explicit = SearchSummariesParams {
            project: Some("other".into()),
            order_by: Some("date_asc".into()),
            ..Default::default()
        };
        let options = explicit.into_options(Some("ignored")).unwrap();
        assert_eq!(options.filters.project.as_deref(), Some("other"));
        assert_eq!(options.order_by, OrderBy::DateAsc);
        assert!(options.filters.date_range.is_none());
    }

    #[test]
    fn bad_order_is_a_filter_error() {
        let params = SearchSummariesParams {
            order_by: Some("sideways".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.into_options(None),
            Err(StoreError::InvalidFilter(_))
        ));
    }
}
