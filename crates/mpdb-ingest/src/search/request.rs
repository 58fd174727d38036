//! RCSB search API request body and result parsing

use crate::search::query::QueryNode;
use crate::search::SearchError;
use mpdb_common::{Identifier, IdentifierSet};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Full search request: one representative polymer entity per UniProt
/// accession, every hit returned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: QueryNode,
    pub request_options: RequestOptions,
    pub return_type: String,
}

impl SearchRequest {
    pub fn new(query: QueryNode) -> Self {
        Self {
            query,
            request_options: RequestOptions::default(),
            return_type: "polymer_entity".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOptions {
    pub results_verbosity: String,
    pub return_all_hits: bool,
    pub group_by: GroupBy,
    pub group_by_return_type: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            results_verbosity: "compact".to_string(),
            return_all_hits: true,
            group_by: GroupBy {
                aggregation_method: "matching_uniprot_accession".to_string(),
                ranking_criteria_type: RankingCriteria {
                    sort_by: "coverage".to_string(),
                },
            },
            group_by_return_type: "representatives".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBy {
    pub aggregation_method: String,
    pub ranking_criteria_type: RankingCriteria,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingCriteria {
    pub sort_by: String,
}

/// Reduce a search answer to entry identifiers.
///
/// `result_set` items are polymer entity ids (`1CBS_1`), either bare strings
/// (compact verbosity) or objects carrying an `identifier`.
pub fn parse_result_set(body: &Value) -> Result<IdentifierSet, SearchError> {
    let items = match body.get("result_set") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(SearchError::UnexpectedResponse(format!(
                "result_set is not a list: {other}"
            )))
        }
        None => {
            return Err(SearchError::UnexpectedResponse(
                "missing result_set".to_string(),
            ))
        }
    };

    let mut ids = IdentifierSet::new();
    for item in items {
        let raw = match item {
            Value::String(raw) => raw.as_str(),
            Value::Object(_) => item
                .get("identifier")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SearchError::UnexpectedResponse(format!("result without identifier: {item}"))
                })?,
            other => {
                return Err(SearchError::UnexpectedResponse(format!(
                    "unexpected result item: {other}"
                )))
            }
        };
        match Identifier::pdb_code(raw) {
            Ok(id) => {
                ids.insert(id);
            }
            Err(e) => debug!(item = raw, error = %e, "Skipping unusable search hit"),
        }
    }

    Ok(ids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_options_shape() {
        let request = SearchRequest::new(QueryNode::Terminal {
            service: "text".to_string(),
            parameters: json!({"value": "membrane"}),
        });
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["return_type"], "polymer_entity");
        assert_eq!(
            value["request_options"],
            json!({
                "results_verbosity": "compact",
                "return_all_hits": true,
                "group_by": {
                    "aggregation_method": "matching_uniprot_accession",
                    "ranking_criteria_type": {"sort_by": "coverage"}
                },
                "group_by_return_type": "representatives"
            })
        );
        assert_eq!(value["query"]["type"], "terminal");
    }

    #[test]
    fn test_result_set_reduced_to_entry_codes() {
        let body = json!({
            "total_count": 4,
            "result_set": ["1CBS_1", "1cbs_2", {"identifier": "2RH1_1", "score": 1.0}, "6KZO_3"]
        });
        let ids = parse_result_set(&body).unwrap();
        let names: Vec<&str> = ids.iter().map(Identifier::as_str).collect();
        assert_eq!(names, vec!["1cbs", "2rh1", "6kzo"]);
    }

    #[test]
    fn test_missing_result_set_is_error() {
        assert!(matches!(
            parse_result_set(&json!({"status": 400})),
            Err(SearchError::UnexpectedResponse(_))
        ));
    }
}
