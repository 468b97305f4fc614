use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::{GraphQlResponse, OperationKind, QueryCandidate, RemoteError};

/// Root fields the endpoint exposes, learned from one introspection query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaContract {
    pub query_fields: BTreeSet<String>,
    pub mutation_fields: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaRoots {
    query_type: Option<RootType>,
    mutation_type: Option<RootType>,
}

#[derive(Deserialize)]
struct RootType {
    #[serde(default)]
    fields: Vec<NamedField>,
}

#[derive(Deserialize)]
struct NamedField {
    name: String,
}

impl SchemaContract {
    pub fn from_response(response: GraphQlResponse) -> Result<Self, RemoteError> {
        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            return Err(RemoteError::Application(errors.into_iter().map(|e| e.message).collect()));
        }

        let schema = response
            .data
            .and_then(|mut data| data.get_mut("__schema").map(Value::take))
            .ok_or_else(|| RemoteError::Shape("__schema missing from introspection".to_string()))?;

        let roots: SchemaRoots = serde_json::from_value(schema).map_err(|e| RemoteError::Shape(e.to_string()))?;
        let names = |root: Option<RootType>| -> BTreeSet<String> {
            root.map(|r| r.fields.into_iter().map(|f| f.name).collect()).unwrap_or_default()
        };

        Ok(Self {
            query_fields: names(roots.query_type),
            mutation_fields: names(roots.mutation_type),
        })
    }

    pub fn supports(&self, candidate: &QueryCandidate) -> bool {
        let fields = match candidate.kind {
            OperationKind::Query => &self.query_fields,
            OperationKind::Mutation => &self.mutation_fields,
        };
        candidate
            .root_fields
            .iter()
            .all(|field| field.starts_with("__") || fields.contains(*field))
    }
}
