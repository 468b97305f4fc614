// Request shapes understood by the CRM GraphQL endpoint, ordered by preference

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crm_shared::{de, OrderDigest};

use super::{GraphQlRequest, OperationKind, QueryCandidate};

pub const RECENT_ORDER_LIMIT: i64 = 5;

/// An order node as the endpoint returns it, in either field spelling.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    #[serde(alias = "total_amount", deserialize_with = "de::money")]
    pub total_amount: Decimal,
    #[serde(alias = "order_date", deserialize_with = "de::timestamp")]
    pub order_date: DateTime<Utc>,
    #[serde(default)]
    pub customer: Option<RemoteCustomer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteCustomer {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<RemoteOrder> for OrderDigest {
    fn from(order: RemoteOrder) -> Self {
        let customer = order.customer.unwrap_or_default();
        OrderDigest {
            id: order.id,
            customer_name: customer.name.unwrap_or_else(|| "N/A".to_string()),
            customer_email: customer.email.unwrap_or_else(|| "N/A".to_string()),
            total_amount: order.total_amount,
            order_date: order.order_date,
        }
    }
}

pub fn low_stock_mutation() -> Vec<QueryCandidate> {
    vec![QueryCandidate {
        label: "updateLowStockProducts",
        kind: OperationKind::Mutation,
        root_fields: &["updateLowStockProducts"],
        request: GraphQlRequest::new(
            r#"
            mutation {
                updateLowStockProducts {
                    success
                    message
                    updatedProducts {
                        id
                        name
                        stock
                        price
                    }
                }
            }
            "#,
        ),
    }]
}

pub fn report_queries() -> Vec<QueryCandidate> {
    vec![
        QueryCandidate {
            label: "aggregates",
            kind: OperationKind::Query,
            root_fields: &["totalCustomers", "totalOrders", "totalRevenue", "recentOrders"],
            request: GraphQlRequest::new(
                r#"
                query RecentOrders($limit: Int!) {
                    totalCustomers
                    totalOrders
                    totalRevenue
                    recentOrders(limit: $limit) {
                        id
                        totalAmount
                        orderDate
                        customer {
                            name
                            email
                        }
                    }
                }
                "#,
            )
            .with_variables(json!({ "limit": RECENT_ORDER_LIMIT })),
        },
        QueryCandidate {
            label: "connections",
            kind: OperationKind::Query,
            root_fields: &["allCustomers", "allOrders"],
            request: GraphQlRequest::new(
                r#"
                query {
                    allCustomers {
                        totalCount
                    }
                    allOrders {
                        totalCount
                        edges {
                            node {
                                id
                                totalAmount
                                orderDate
                                customer {
                                    name
                                    email
                                }
                            }
                        }
                    }
                }
                "#,
            ),
        },
    ]
}

pub fn orders_since_queries(since: DateTime<Utc>) -> Vec<QueryCandidate> {
    let variables = json!({ "since": since.to_rfc3339_opts(SecondsFormat::Secs, true) });
    let body = |root: &str| {
        format!(
            r#"
            query GetRecentOrders($since: DateTime!) {{
                {root}(filter: {{orderDate: {{gte: $since}}}}) {{
                    id
                    customer {{
                        email
                        name
                    }}
                    orderDate
                    totalAmount
                }}
            }}
            "#
        )
    };

    vec![
        QueryCandidate {
            label: "orders",
            kind: OperationKind::Query,
            root_fields: &["orders"],
            request: GraphQlRequest::new(body("orders")).with_variables(variables.clone()),
        },
        QueryCandidate {
            label: "allOrders",
            kind: OperationKind::Query,
            root_fields: &["allOrders"],
            request: GraphQlRequest::new(body("allOrders")).with_variables(variables),
        },
    ]
}

/// Cheap queries any GraphQL server can answer, tried in order.
pub fn reachability_probes() -> Vec<GraphQlRequest> {
    vec![
        GraphQlRequest::new("{ hello }"),
        GraphQlRequest::new("{ __schema { queryType { name } } }"),
        GraphQlRequest::new("{ __typename }"),
    ]
}

pub fn introspect_roots() -> GraphQlRequest {
    GraphQlRequest::new(
        "{ __schema { queryType { fields { name } } mutationType { fields { name } } } }",
    )
}

pub fn introspect_types() -> GraphQlRequest {
    GraphQlRequest::new("{ __schema { types { name fields { name } } } }")
}
