//! Petition search query builder.
//!
//! Filters become bound parameters; only the ORDER BY tokens, chosen from
//! [`SortBy`], are written into the SQL text.

use rusqlite::types::Value;

use petition_types::api::SearchQuery;
use petition_types::models::SortBy;

/// Stand-in limit so an offset can be applied when no count was requested.
pub const UNBOUNDED_LIMIT: i64 = 1_000_000_000;

const SUMMARY_SELECT: &str = "SELECT p.petition_id, p.title, c.name, u.name,
        COALESCE(s.signature_count, 0) AS signature_count
     FROM petitions p
     LEFT JOIN users u ON u.user_id = p.author_id
     LEFT JOIN categories c ON c.category_id = p.category_id
     LEFT JOIN (SELECT petition_id, COUNT(signatory_id) AS signature_count
                FROM signatures
                GROUP BY petition_id) s ON s.petition_id = p.petition_id";

#[derive(Debug)]
pub struct SearchSql {
    pub sql: String,
    pub params: Vec<Value>,
}

fn order_clause(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::AlphabeticalAsc => "p.title COLLATE NOCASE ASC",
        SortBy::AlphabeticalDesc => "p.title COLLATE NOCASE DESC",
        SortBy::SignaturesAsc => "signature_count ASC",
        SortBy::SignaturesDesc => "signature_count DESC",
    }
}

pub fn build_search(query: &SearchQuery) -> SearchSql {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(q) = &query.q {
        conditions.push("p.title LIKE ?");
        params.push(Value::Text(format!("%{}%", q)));
    }
    if let Some(category_id) = query.category_id {
        conditions.push("p.category_id = ?");
        params.push(Value::Integer(category_id));
    }
    if let Some(author_id) = query.author_id {
        conditions.push("p.author_id = ?");
        params.push(Value::Integer(author_id));
    }

    let mut sql = String::from(SUMMARY_SELECT);
    if !conditions.is_empty() {
        sql.push_str("\n     WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str("\n     ORDER BY ");
    sql.push_str(order_clause(query.sort_by));
    sql.push_str(", p.petition_id ASC");

    match (query.count, query.start_index) {
        (Some(count), start) => {
            sql.push_str("\n     LIMIT ?");
            params.push(Value::Integer(count));
            if let Some(start) = start {
                sql.push_str(" OFFSET ?");
                params.push(Value::Integer(start));
            }
        }
        (None, Some(start)) => {
            sql.push_str("\n     LIMIT ? OFFSET ?");
            params.push(Value::Integer(UNBOUNDED_LIMIT));
            params.push(Value::Integer(start));
        }
        (None, None) => {}
    }

    SearchSql { sql, params }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_has_no_filters_or_limit() {
        let built = build_search(&SearchQuery::default());
        assert!(!built.sql.contains("WHERE"));
        assert!(!built.sql.contains("LIMIT"));
        assert!(built.sql.ends_with("ORDER BY signature_count DESC, p.petition_id ASC"));
        assert!(built.params.is_empty());
    }

    #[test]
    fn filters_are_bound_not_interpolated() {
        let query = SearchQuery {
            q: Some("'; DROP TABLE petitions; --".into()),
            category_id: Some(3),
            author_id: Some(7),
            ..Default::default()
        };
        let built = build_search(&query);

        assert!(!built.sql.contains("DROP TABLE"));
        assert!(built.sql.contains("p.title LIKE ? AND p.category_id = ? AND p.author_id = ?"));
        assert_eq!(
            built.params,
            vec![
                Value::Text("%'; DROP TABLE petitions; --%".into()),
                Value::Integer(3),
                Value::Integer(7),
            ]
        );
    }

    #[test]
    fn sort_tokens_come_from_the_enumeration() {
        let query = SearchQuery {
            sort_by: SortBy::AlphabeticalDesc,
            ..Default::default()
        };
        assert!(
            build_search(&query)
                .sql
                .contains("ORDER BY p.title COLLATE NOCASE DESC, p.petition_id ASC")
        );
    }

    #[test]
    fn offset_without_count_uses_unbounded_limit() {
        let query = SearchQuery {
            start_index: Some(5),
            ..Default::default()
        };
        let built = build_search(&query);
        assert!(built.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(built.params, vec![Value::Integer(UNBOUNDED_LIMIT), Value::Integer(5)]);
    }

    #[test]
    fn count_and_offset_bind_in_order() {
        let query = SearchQuery {
            count: Some(2),
            start_index: Some(1),
            ..Default::default()
        };
        let built = build_search(&query);
        assert!(built.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(built.params, vec![Value::Integer(2), Value::Integer(1)]);
    }
}
