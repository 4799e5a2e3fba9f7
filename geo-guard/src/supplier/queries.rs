//! SPARQL queries shipped with the crate, one per entity class.
//!
//! Each query projects the snapshot header of its class in order, so the
//! CSV answer of the endpoint loads as is. The acquisition configuration can
//! point any class at another query file.

use crate::model::EntityClass;

/// The shipped query of `class`.
pub fn bundled_query(class: EntityClass) -> &'static str {
    match class {
        EntityClass::Department => include_str!("../../queries/departements.rq"),
        EntityClass::OverseasCollectivity => include_str!("../../queries/collectivites_outremer.rq"),
        EntityClass::District => include_str!("../../queries/districts.rq"),
        EntityClass::Country => include_str!("../../queries/pays.rq"),
        EntityClass::Commune => include_str!("../../queries/communes.rq"),
        EntityClass::MunicipalArrondissement => {
            include_str!("../../queries/arrondissements_municipaux.rq")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Variables of the SELECT clause, including aggregate aliases.
    fn projected(query: &str) -> Vec<String> {
        let select = query.split("SELECT").nth(1).unwrap();
        let select = select.split("WHERE").next().unwrap();
        let mut names = Vec::new();
        let mut tokens = select.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.starts_with('(') {
                // Aggregate: the alias follows the next `AS`.
                for inner in tokens.by_ref() {
                    if inner == "AS" {
                        break;
                    }
                }
                if let Some(alias) = tokens.next() {
                    names.push(alias.trim_start_matches('?').trim_end_matches(')').to_string());
                }
            } else if let Some(name) = token.strip_prefix('?') {
                names.push(name.to_string());
            }
        }
        names
    }

    #[test]
    fn test_queries_project_the_snapshot_header() {
        for class in EntityClass::COLLECTION_ORDER {
            let expected: Vec<String> = class
                .descriptor()
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            assert_eq!(projected(bundled_query(class)), expected, "{class}");
        }
    }

    #[test]
    fn test_parent_classes_are_filtered() {
        assert!(bundled_query(EntityClass::Commune).contains("igeo:CollectiviteDOutreMer"));
        assert!(bundled_query(EntityClass::MunicipalArrondissement).contains("igeo:Commune }"));
        assert!(!bundled_query(EntityClass::Department).contains("parent_uri"));
    }
}
