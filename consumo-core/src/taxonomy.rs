//! The fixed six-category spending taxonomy.
//!
//! Wire identifiers are case-sensitive and keep their accents (`ALIMENTACIÓN`),
//! because dashboard consumers key on them. Ordering is lexicographic by
//! identifier so every `BTreeMap<Category, _>` serialises the same way twice.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Wire string for a failed oracle call.
pub const ERROR_LABEL: &str = "ERROR";

/// One of the six spending categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Category {
    Alimentacion,
    Transporte,
    Compras,
    Servicios,
    Bancario,
    Entretenimiento,
}

impl Category {
    /// Taxonomy order, as presented to the oracle.
    pub const ALL: [Category; 6] = [
        Category::Alimentacion,
        Category::Transporte,
        Category::Compras,
        Category::Servicios,
        Category::Bancario,
        Category::Entretenimiento,
    ];

    /// Catch-all bucket for unparseable or unrecognised responses.
    pub const FALLBACK: Category = Category::Compras;

    pub fn identifier(&self) -> &'static str {
        match self {
            Category::Alimentacion => "ALIMENTACIÓN",
            Category::Transporte => "TRANSPORTE",
            Category::Compras => "COMPRAS",
            Category::Servicios => "SERVICIOS",
            Category::Bancario => "BANCARIO",
            Category::Entretenimiento => "ENTRETENIMIENTO",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Category::Alimentacion => "🍕",
            Category::Transporte => "🚗",
            Category::Compras => "🛒",
            Category::Servicios => "🏠",
            Category::Bancario => "💳",
            Category::Entretenimiento => "🎮",
        }
    }

    /// Short prose description used by listings.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Alimentacion => {
                "Restaurantes, supermercados, delivery, cafeterías, tiendas de conveniencia"
            }
            Category::Transporte => "Uber, taxi, combustible, peajes, mantenimiento vehicular",
            Category::Compras => "Tiendas departamentales, online, ropa, tecnología, farmacias",
            Category::Servicios => "Servicios básicos, streaming, suscripciones, seguros",
            Category::Bancario => "Comisiones bancarias, transferencias, servicios financieros",
            Category::Entretenimiento => "Cines, gimnasios, juegos, eventos recreativos",
        }
    }

    pub fn examples(&self) -> &'static [&'static str] {
        match self {
            Category::Alimentacion => &["KFC", "Plaza Vea", "Rappi", "Starbucks", "Tambo"],
            Category::Transporte => &["Uber", "Primax", "Petroperú", "Talleres"],
            Category::Compras => &["Falabella", "Amazon", "Zara", "InkaFarma"],
            Category::Servicios => &["Netflix", "Google", "Luz del Sur", "Spotify"],
            Category::Bancario => &["PLIN", "Comisiones BCP", "Transferencias"],
            Category::Entretenimiento => &["Cineplex", "Gimnasios", "Steam", "Conciertos"],
        }
    }

    /// Bullet lines embedded under the category heading in classification prompts.
    pub fn prompt_lines(&self) -> &'static [&'static str] {
        match self {
            Category::Alimentacion => &[
                "Restaurantes: KFC, McDonald's, Pizza Hut, Chilis, etc.",
                "Supermercados: Plaza Vea, Metro, Tottus, Wong, Vivanda",
                "Delivery: Rappi, UberEats, PedidosYa, Glovo",
                "Cafeterías: Starbucks, Juan Valdez, San Antonio",
                "Panaderías, mercados, tiendas de conveniencia como Tambo",
            ],
            Category::Transporte => &[
                "Uber, taxi, apps de transporte",
                "Combustible: Primax, Petroperú, Repsol",
                "Peajes, estacionamiento",
                "Mantenimiento de vehículo, talleres",
            ],
            Category::Compras => &[
                "Tiendas por departamento: Falabella, Ripley, Saga",
                "Tiendas online: Amazon, MercadoLibre",
                "Ropa: Zara, H&M, Forever 21",
                "Tecnología: Apple Store, Samsung, tiendas de electrónicos",
                "Farmacias: InkaFarma, Boticas, Mifarma",
            ],
            Category::Servicios => &[
                "Servicios básicos: Luz del Sur, Sedapal, gas, internet, telefonía",
                "Streaming: Netflix, Spotify, Disney+, Amazon Prime",
                "Suscripciones: Google, Microsoft, Adobe",
                "Seguros, alquiler",
            ],
            Category::Bancario => &[
                "Comisiones bancarias, mantenimiento de cuenta",
                "Transferencias, cambio de divisas",
                "Intereses, pagos de tarjetas",
                "Servicios financieros",
            ],
            Category::Entretenimiento => &[
                "Cines: Cineplex, Cineplanet, UVK",
                "Gimnasios, deportes",
                "Juegos, apps de entretenimiento",
                "Eventos, conciertos, actividades recreativas",
            ],
        }
    }

    /// Resolve a free-text label to a category.
    ///
    /// Exact identifier match first, then a tolerant match ignoring case and
    /// the common Spanish accents (`Alimentacion` -> `ALIMENTACIÓN`).
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        if let Some(c) = Category::ALL.iter().find(|c| c.identifier() == label) {
            return Some(*c);
        }
        let folded = fold(label);
        Category::ALL
            .iter()
            .find(|c| fold(c.identifier()) == folded)
            .copied()
    }
}

/// Uppercase and strip accents so near-miss labels still resolve.
fn fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'Á' | 'á' => 'A',
            'É' | 'é' => 'E',
            'Í' | 'í' => 'I',
            'Ó' | 'ó' => 'O',
            'Ú' | 'ú' => 'U',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identifier().cmp(other.identifier())
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl From<Category> for &'static str {
    fn from(c: Category) -> Self {
        c.identifier()
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Category::from_label(&s).ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// The category token as the oracle returned it.
///
/// Unrecognised tokens are kept verbatim for traceability; aggregation
/// routes them to the catch-all bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Label {
    Canonical(Category),
    Error,
    Other(String),
}

impl Label {
    /// Bucket this label aggregates into.
    pub fn bucket(&self) -> Category {
        match self {
            Label::Canonical(c) => *c,
            Label::Error | Label::Other(_) => Category::FALLBACK,
        }
    }

    pub fn glyph(&self) -> &'static str {
        self.bucket().glyph()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Label::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Canonical(c) => c.identifier(),
            Label::Error => ERROR_LABEL,
            Label::Other(s) => s,
        }
    }
}

impl From<Category> for Label {
    fn from(c: Category) -> Self {
        Label::Canonical(c)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case(ERROR_LABEL) {
            return Label::Error;
        }
        match Category::from_label(s) {
            Some(c) => Label::Canonical(c),
            None => Label::Other(s.to_string()),
        }
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label::from(s.as_str())
    }
}

impl From<Label> for String {
    fn from(l: Label) -> Self {
        l.as_str().to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing entry for one category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    #[serde(rename = "categoria")]
    pub category: Category,
    pub emoji: &'static str,
    #[serde(rename = "descripcion")]
    pub description: &'static str,
    #[serde(rename = "ejemplos")]
    pub examples: &'static [&'static str],
}

/// The whole taxonomy in taxonomy order.
pub fn taxonomy_listing() -> Vec<CategoryInfo> {
    Category::ALL
        .iter()
        .map(|c| CategoryInfo {
            category: *c,
            emoji: c.glyph(),
            description: c.description(),
            examples: c.examples(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_exactly_six_distinct_categories() {
        let mut ids: Vec<_> = Category::ALL.iter().map(|c| c.identifier()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_ordering_is_lexicographic_by_identifier() {
        let mut cats = Category::ALL.to_vec();
        cats.sort();
        let ids: Vec<_> = cats.iter().map(|c| c.identifier()).collect();
        assert_eq!(
            ids,
            vec![
                "ALIMENTACIÓN",
                "BANCARIO",
                "COMPRAS",
                "ENTRETENIMIENTO",
                "SERVICIOS",
                "TRANSPORTE"
            ]
        );
    }

    #[test]
    fn test_from_label_exact_and_tolerant() {
        assert_eq!(Category::from_label("COMPRAS"), Some(Category::Compras));
        assert_eq!(Category::from_label("  SERVICIOS "), Some(Category::Servicios));
        assert_eq!(Category::from_label("Alimentacion"), Some(Category::Alimentacion));
        assert_eq!(Category::from_label("alimentación"), Some(Category::Alimentacion));
        assert_eq!(Category::from_label("VIAJES"), None);
        assert_eq!(Category::from_label(""), None);
    }

    #[test]
    fn test_label_buckets() {
        assert_eq!(Label::from("TRANSPORTE").bucket(), Category::Transporte);
        assert_eq!(Label::from("ERROR").bucket(), Category::FALLBACK);
        assert!(Label::from("ERROR").is_error());

        let other = Label::from("MASCOTAS");
        assert_eq!(other, Label::Other("MASCOTAS".to_string()));
        assert_eq!(other.bucket(), Category::Compras);
        assert_eq!(other.glyph(), "🛒");
        assert_eq!(other.to_string(), "MASCOTAS");
    }

    #[test]
    fn test_category_map_keys_serialize_as_identifiers() {
        let mut m = BTreeMap::new();
        m.insert(Category::Transporte, 1);
        m.insert(Category::Alimentacion, 2);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"ALIMENTACIÓN":2,"TRANSPORTE":1}"#);

        let back: BTreeMap<Category, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_label_serde_roundtrip_keeps_unknown_text() {
        let json = serde_json::to_string(&Label::Other("VIAJES".into())).unwrap();
        assert_eq!(json, r#""VIAJES""#);
        let back: Label = serde_json::from_str(r#""ENTRETENIMIENTO""#).unwrap();
        assert_eq!(back, Label::Canonical(Category::Entretenimiento));
    }

    #[test]
    fn test_listing_in_taxonomy_order() {
        let listing = taxonomy_listing();
        assert_eq!(listing.len(), 6);
        assert_eq!(listing[0].category, Category::Alimentacion);
        assert_eq!(listing[0].emoji, "🍕");
        assert!(listing[0].examples.contains(&"Tambo"));
    }
}
