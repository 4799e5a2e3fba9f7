//! Entity classes and their descriptors.
//!
//! Every administrative entity kind shares one record shape. What differs is
//! captured by an [`EntityDescriptor`]: view name, URI and code patterns,
//! parent classes and the class-specific extra columns.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const URI_PREFIX: &str = "http://id.insee.fr/geo/";
const UUID_PATTERN: &str = "[0-9a-z]{8}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{12}";
const EVENT_SEGMENT: &str = "evenementGeographique";

/// Pattern shared by every class for the grammatical-article code.
pub const QUALIFIER_PATTERN: &str = r"^[0-8X]$";

/// The six administrative entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityClass {
    #[serde(rename = "departements")]
    Department,
    #[serde(rename = "collectivites_outremer")]
    OverseasCollectivity,
    #[serde(rename = "districts")]
    District,
    #[serde(rename = "pays")]
    Country,
    #[serde(rename = "communes")]
    Commune,
    #[serde(rename = "arrondissements_municipaux")]
    MunicipalArrondissement,
}

impl EntityClass {
    /// Collection order. Parents always come before their children.
    pub const COLLECTION_ORDER: [EntityClass; 6] = [
        EntityClass::Department,
        EntityClass::OverseasCollectivity,
        EntityClass::District,
        EntityClass::Country,
        EntityClass::Commune,
        EntityClass::MunicipalArrondissement,
    ];

    /// Returns the static descriptor of this class.
    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            EntityClass::Commune => &COMMUNE,
            EntityClass::MunicipalArrondissement => &ARRONDISSEMENT,
            EntityClass::Department => &DEPARTMENT,
            EntityClass::OverseasCollectivity => &OVERSEAS_COLLECTIVITY,
            EntityClass::District => &DISTRICT,
            EntityClass::Country => &COUNTRY,
        }
    }

    /// Configuration key of this class.
    pub fn key(self) -> &'static str {
        match self {
            EntityClass::Commune => "communes",
            EntityClass::MunicipalArrondissement => "arrondissements_municipaux",
            EntityClass::Department => "departements",
            EntityClass::OverseasCollectivity => "collectivites_outremer",
            EntityClass::District => "districts",
            EntityClass::Country => "pays",
        }
    }

    /// Snapshot file name used under each stage directory.
    pub fn file_name(self) -> String {
        format!("{}.csv", self.key())
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Logical type of a snapshot column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
    Count,
}

impl ColumnType {
    fn data_type(self) -> DataType {
        match self {
            ColumnType::Text => DataType::Utf8,
            ColumnType::Date => DataType::Date32,
            ColumnType::Count => DataType::Int64,
        }
    }
}

/// A column that must match a regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub column: &'static str,
    pub pattern: String,
}

/// Everything that distinguishes one entity class from another.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub class: EntityClass,
    /// Name of the queryable view holding the working snapshot
    pub view_name: &'static str,
    /// Human readable description used in diagnostics
    pub description: &'static str,
    /// Path segment of the class in entity URIs
    pub uri_segment: &'static str,
    pub code_pattern: &'static str,
    /// Classes whose records may be referenced in `parent_uri`
    pub parent_classes: &'static [EntityClass],
    /// Whether `parent_uri` must resolve to exactly one value
    pub single_parent: bool,
    /// Class-specific text columns and their patterns, placed after `article_code`
    pub extra_columns: &'static [(&'static str, Option<&'static str>)],
}

static COMMUNE: EntityDescriptor = EntityDescriptor {
    class: EntityClass::Commune,
    view_name: "insee_communes",
    description: "Communes",
    uri_segment: "commune",
    code_pattern: r"^(0[1-9]|[1-8][0-9]|9[0-8]|2[AB])[0-9]{3}$",
    parent_classes: &[EntityClass::Department, EntityClass::OverseasCollectivity],
    single_parent: false,
    extra_columns: &[],
};

static ARRONDISSEMENT: EntityDescriptor = EntityDescriptor {
    class: EntityClass::MunicipalArrondissement,
    view_name: "insee_arrondissements_municipaux",
    description: "Arrondissements municipaux",
    uri_segment: "arrondissementMunicipal",
    code_pattern: r"^(13|69|75)[0-9]{3}$",
    parent_classes: &[EntityClass::Commune],
    single_parent: true,
    extra_columns: &[],
};

static DEPARTMENT: EntityDescriptor = EntityDescriptor {
    class: EntityClass::Department,
    view_name: "insee_departements",
    description: "Départements",
    uri_segment: "departement",
    code_pattern: r"^(0[1-9]|[1-8][0-9]|9[0-5]|2[AB]|97[1-9])$",
    parent_classes: &[],
    single_parent: false,
    extra_columns: &[],
};

static OVERSEAS_COLLECTIVITY: EntityDescriptor = EntityDescriptor {
    class: EntityClass::OverseasCollectivity,
    view_name: "insee_collectivites_outremer",
    description: "Collectivités d'outre-mer",
    uri_segment: "collectiviteDOutreMer",
    code_pattern: r"^(95|96|975|976|977|978|981|984|985|986|987|988|989|98[0-9]{3})$",
    parent_classes: &[],
    single_parent: false,
    extra_columns: &[],
};

static DISTRICT: EntityDescriptor = EntityDescriptor {
    class: EntityClass::District,
    view_name: "insee_districts",
    description: "Districts",
    uri_segment: "district",
    code_pattern: r"^98[0-9]{3}$",
    parent_classes: &[],
    single_parent: false,
    extra_columns: &[],
};

static COUNTRY: EntityDescriptor = EntityDescriptor {
    class: EntityClass::Country,
    view_name: "insee_pays",
    description: "Pays (countries)",
    uri_segment: "pays",
    code_pattern: r"^99[0-9]{3}$",
    parent_classes: &[],
    single_parent: false,
    extra_columns: &[
        ("long_label", None),
        ("iso3166alpha2_code", Some(r"^([A-Z]{2})?$")),
        ("iso3166alpha3_code", Some(r"^([A-Z]{3})?$")),
        ("iso3166num_code", Some(r"^([0-9]{3})?$")),
    ],
};

struct CompiledPatterns {
    uri: Regex,
    code: Regex,
    qualifier: Regex,
    parent_uris: Option<Regex>,
}

#[allow(clippy::expect_used)]
static COMPILED: Lazy<HashMap<EntityClass, CompiledPatterns>> = Lazy::new(|| {
    EntityClass::COLLECTION_ORDER
        .iter()
        .map(|class| {
            let d = class.descriptor();
            let compiled = CompiledPatterns {
                uri: Regex::new(&d.uri_pattern()).expect("Hard-coded URI pattern should be valid"),
                code: Regex::new(d.code_pattern).expect("Hard-coded code pattern should be valid"),
                qualifier: Regex::new(QUALIFIER_PATTERN)
                    .expect("Hard-coded qualifier pattern should be valid"),
                parent_uris: d.parent_uri_pattern().map(|p| {
                    Regex::new(&p).expect("Hard-coded parent pattern should be valid")
                }),
            };
            (*class, compiled)
        })
        .collect()
});

fn entity_uri_pattern(segments: &str) -> String {
    format!("{URI_PREFIX}{segments}/{UUID_PATTERN}")
}

/// Pattern of a mandatory geographic event URI.
pub fn start_event_pattern() -> String {
    format!("^{}$", entity_uri_pattern(EVENT_SEGMENT))
}

/// Pattern of an optional geographic event URI (empty allowed).
pub fn end_event_pattern() -> String {
    format!("^({})?$", entity_uri_pattern(EVENT_SEGMENT))
}

impl EntityDescriptor {
    /// Anchored pattern every record URI of the class must match.
    pub fn uri_pattern(&self) -> String {
        format!("^{}$", entity_uri_pattern(self.uri_segment))
    }

    /// Pattern of the `|`-separated parent list, for classes with parents.
    pub fn parent_uri_pattern(&self) -> Option<String> {
        if self.parent_classes.is_empty() {
            return None;
        }
        let segments = self
            .parent_classes
            .iter()
            .map(|c| c.descriptor().uri_segment)
            .collect::<Vec<_>>()
            .join("|");
        let one = entity_uri_pattern(&format!("({segments})"));
        Some(format!("^({one})([|]{one})*$"))
    }

    pub fn has_parents(&self) -> bool {
        !self.parent_classes.is_empty()
    }

    /// Ordered column list of the snapshot files.
    pub fn columns(&self) -> Vec<(&'static str, ColumnType)> {
        let mut columns = vec![
            ("uri", ColumnType::Text),
            ("insee_code", ColumnType::Text),
            ("label", ColumnType::Text),
            ("article_code", ColumnType::Text),
        ];
        columns.extend(self.extra_columns.iter().map(|(name, _)| (*name, ColumnType::Text)));
        if self.has_parents() {
            columns.push(("parent_uri", ColumnType::Text));
        }
        columns.extend([
            ("start_event_uri", ColumnType::Text),
            ("end_event_uri", ColumnType::Text),
            ("start_date", ColumnType::Date),
            ("end_date", ColumnType::Date),
        ]);
        if self.has_parents() {
            columns.push(("parent_uri_count", ColumnType::Count));
        }
        columns.extend([
            ("start_date_count", ColumnType::Count),
            ("end_date_count", ColumnType::Count),
        ]);
        columns
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().into_iter().map(|(name, _)| name).collect()
    }

    /// Arrow schema of the snapshot files. Every column is nullable; null
    /// handling is the business of the checks.
    pub fn schema(&self) -> SchemaRef {
        let fields = self
            .columns()
            .into_iter()
            .map(|(name, ty)| Field::new(name, ty.data_type(), true))
            .collect::<Vec<_>>();
        Arc::new(Schema::new(fields))
    }

    /// Format rules of the code, qualifier, extra and event columns, in
    /// catalog order. The parent list has its own rule, see
    /// [`parent_uri_pattern`](Self::parent_uri_pattern).
    pub fn pattern_rules(&self) -> Vec<PatternRule> {
        let mut rules = vec![
            PatternRule {
                column: "insee_code",
                pattern: self.code_pattern.to_string(),
            },
            PatternRule {
                column: "article_code",
                pattern: QUALIFIER_PATTERN.to_string(),
            },
        ];
        rules.extend(self.extra_columns.iter().filter_map(|(column, pattern)| {
            pattern.map(|p| PatternRule {
                column: *column,
                pattern: p.to_string(),
            })
        }));
        rules.push(PatternRule {
            column: "start_event_uri",
            pattern: start_event_pattern(),
        });
        rules.push(PatternRule {
            column: "end_event_uri",
            pattern: end_event_pattern(),
        });
        rules
    }

    fn compiled(&self) -> Option<&'static CompiledPatterns> {
        COMPILED.get(&self.class)
    }

    pub fn uri_matches(&self, uri: &str) -> bool {
        self.compiled().is_some_and(|c| c.uri.is_match(uri))
    }

    pub fn code_matches(&self, code: &str) -> bool {
        self.compiled().is_some_and(|c| c.code.is_match(code))
    }

    pub fn qualifier_matches(&self, qualifier: &str) -> bool {
        self.compiled().is_some_and(|c| c.qualifier.is_match(qualifier))
    }

    /// Checks the joined parent list. Classes without parents accept only an
    /// empty list.
    pub fn parent_uris_match(&self, parent_uris: &[String]) -> bool {
        match self.compiled().and_then(|c| c.parent_uris.as_ref()) {
            Some(regex) => regex.is_match(&parent_uris.join("|")),
            None => parent_uris.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMUNE_URI: &str = "http://id.insee.fr/geo/commune/0a1b2c3d-0000-1111-2222-333344445555";
    const DEPARTMENT_URI: &str =
        "http://id.insee.fr/geo/departement/aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    #[test]
    fn test_collection_order_puts_parents_first() {
        for (position, class) in EntityClass::COLLECTION_ORDER.iter().enumerate() {
            for parent in class.descriptor().parent_classes {
                let parent_position = EntityClass::COLLECTION_ORDER
                    .iter()
                    .position(|c| c == parent)
                    .unwrap();
                assert!(parent_position < position, "{parent} must precede {class}");
            }
        }
    }

    #[test]
    fn test_commune_columns() {
        let d = EntityClass::Commune.descriptor();
        assert_eq!(
            d.column_names(),
            vec![
                "uri",
                "insee_code",
                "label",
                "article_code",
                "parent_uri",
                "start_event_uri",
                "end_event_uri",
                "start_date",
                "end_date",
                "parent_uri_count",
                "start_date_count",
                "end_date_count",
            ]
        );
        assert_eq!(d.schema().field_with_name("start_date").unwrap().data_type(), &DataType::Date32);
    }

    #[test]
    fn test_country_columns_carry_iso_codes() {
        let d = EntityClass::Country.descriptor();
        let names = d.column_names();
        assert_eq!(names[4], "long_label");
        assert_eq!(names[7], "iso3166num_code");
        assert!(!names.contains(&"parent_uri"));
        let rule_columns: Vec<_> = d.pattern_rules().iter().map(|r| r.column).collect();
        assert!(rule_columns.contains(&"iso3166alpha2_code"));
        assert!(!rule_columns.contains(&"long_label"));
    }

    #[test]
    fn test_uri_and_code_predicates() {
        let d = EntityClass::Commune.descriptor();
        assert!(d.uri_matches(COMMUNE_URI));
        assert!(!d.uri_matches(DEPARTMENT_URI));
        assert!(d.code_matches("75056"));
        assert!(d.code_matches("2A004"));
        assert!(!d.code_matches("99100"));
        assert!(d.qualifier_matches("X"));
        assert!(!d.qualifier_matches("9"));

        let dep = EntityClass::Department.descriptor();
        assert!(dep.code_matches("971"));
        assert!(!dep.code_matches("96"));
    }

    #[test]
    fn test_parent_uri_pattern() {
        let d = EntityClass::Commune.descriptor();
        assert!(d.parent_uris_match(&[DEPARTMENT_URI.to_string()]));
        assert!(d.parent_uris_match(&[DEPARTMENT_URI.to_string(), DEPARTMENT_URI.to_string()]));
        assert!(!d.parent_uris_match(&[COMMUNE_URI.to_string()]));
        assert!(!d.parent_uris_match(&[]));

        let arr = EntityClass::MunicipalArrondissement.descriptor();
        assert!(arr.parent_uris_match(&[COMMUNE_URI.to_string()]));

        let country = EntityClass::Country.descriptor();
        assert!(country.parent_uri_pattern().is_none());
        assert!(country.parent_uris_match(&[]));
    }

    #[test]
    fn test_event_patterns() {
        let end = Regex::new(&end_event_pattern()).unwrap();
        assert!(end.is_match(""));
        let start = Regex::new(&start_event_pattern()).unwrap();
        assert!(!start.is_match(""));
        assert!(start.is_match(
            "http://id.insee.fr/geo/evenementGeographique/12345678-abcd-ef01-2345-6789abcdef01"
        ));
    }

    #[test]
    fn test_serde_keys() {
        let json = serde_json::to_string(&EntityClass::OverseasCollectivity).unwrap();
        assert_eq!(json, "\"collectivites_outremer\"");
        let class: EntityClass = serde_json::from_str("\"arrondissements_municipaux\"").unwrap();
        assert_eq!(class, EntityClass::MunicipalArrondissement);
    }
}
