//! Item extraction: turn one page of export XML into [`SourceItem`]s.
//!
//! ## Namespace tolerance
//!
//! Real SPIP exports are inconsistent about namespaces: some declare a
//! default DocBook namespace, some prefix every element, most declare
//! nothing. The original migration worked around this with a cascade of
//! XPath selector variants (`//rubrique`, `//default:rubrique`,
//! `//*[local-name()="rubrique"]`, …). Matching elements by *local name*
//! subsumes the entire cascade: an element named `rubrique` is found no
//! matter which namespace, prefix, or path the export chose.

use roxmltree::Document;
use std::collections::BTreeMap;
use tracing::debug;

/// One SPIP content record, extracted from a page of export XML.
///
/// Immutable once built; consumed exactly once by the transform chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Stable source identifier. Falls back to `item_{index}` when the
    /// export omits an `id` field, so every item can still key an upsert.
    pub id: String,
    /// Raw field values by local field name (`titre`, `texte`, `logourl`, …).
    pub fields: BTreeMap<String, String>,
}

impl SourceItem {
    /// Borrow a raw field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Borrow a raw field, treating blank values as absent.
    pub fn non_empty_field(&self, name: &str) -> Option<&str> {
        self.field(name).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// All text directly inside an element and its descendants, concatenated.
///
/// SPIP stores markup inside fields as entity-escaped text, so after XML
/// decoding this yields the raw markup string the transformers expect.
fn element_text(node: roxmltree::Node<'_, '_>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Some(text) = descendant.text() {
            if descendant.is_text() {
                out.push_str(text);
            }
        }
    }
    out
}

/// Extract every item element (matched by local name) from parsed XML text.
///
/// `start_index` numbers the fallback ids across pages, so page 2's first
/// anonymous item does not collide with page 1's.
///
/// Returns an empty vec when the text does not parse — absence of data is
/// the pagination walker's normal termination signal, not an error here.
pub fn extract_items(xml_text: &str, item_tag: &str, start_index: usize) -> Vec<SourceItem> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let document = match Document::parse_with_options(xml_text, options) {
        Ok(d) => d,
        Err(e) => {
            debug!("page XML did not parse ({e}); treating as empty");
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for (index, node) in document
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == item_tag)
        .enumerate()
    {
        let mut fields = BTreeMap::new();
        for child in node.children().filter(|c| c.is_element()) {
            let name = child.tag_name().name().to_string();
            let value = element_text(child);
            // First occurrence wins; repeated tags in the wild are always
            // duplicates of the same value.
            fields.entry(name).or_insert(value);
        }

        let id = match fields.get("id").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("item_{}", start_index + index),
        };

        items.push(SourceItem { id, fields });
    }

    debug!("extracted {} item(s) with tag '{}'", items.len(), item_tag);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = r#"<?xml version="1.0"?>
<rubriques>
  <rubrique><id>art1</id><titre>First</titre><texte>Body one</texte></rubrique>
  <rubrique><id>art2</id><titre>Second</titre></rubrique>
</rubriques>"#;

    const DEFAULT_NS: &str = r#"<?xml version="1.0"?>
<rubriques xmlns="http://docbook.org/ns/docbook">
  <rubrique><id>art1</id><titre>First</titre></rubrique>
  <rubrique><id>art2</id><titre>Second</titre></rubrique>
</rubriques>"#;

    const PREFIXED: &str = r#"<?xml version="1.0"?>
<d:rubriques xmlns:d="http://docbook.org/ns/docbook">
  <d:rubrique><d:id>art1</d:id><d:titre>First</d:titre></d:rubrique>
  <d:rubrique><d:id>art2</d:id><d:titre>Second</d:titre></d:rubrique>
</d:rubriques>"#;

    #[test]
    fn extracts_plain_items() {
        let items = extract_items(PLAIN, "rubrique", 0);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "art1");
        assert_eq!(items[0].field("titre"), Some("First"));
        assert_eq!(items[0].field("texte"), Some("Body one"));
        assert_eq!(items[1].field("texte"), None);
    }

    #[test]
    fn namespace_variants_are_equivalent() {
        // The same two items must come out regardless of how the export
        // declares its namespace.
        for xml in [PLAIN, DEFAULT_NS, PREFIXED] {
            let items = extract_items(xml, "rubrique", 0);
            assert_eq!(items.len(), 2, "failed for: {}", &xml[..40]);
            assert_eq!(items[0].id, "art1");
            assert_eq!(items[1].id, "art2");
        }
    }

    #[test]
    fn missing_id_gets_offset_fallback() {
        let xml = "<rubriques><rubrique><titre>Anon</titre></rubrique></rubriques>";
        let items = extract_items(xml, "rubrique", 40);
        assert_eq!(items[0].id, "item_40");
    }

    #[test]
    fn unparseable_page_yields_no_items() {
        assert!(extract_items("<broken><xml", "rubrique", 0).is_empty());
        assert!(extract_items("", "rubrique", 0).is_empty());
    }

    #[test]
    fn entity_escaped_markup_is_decoded() {
        let xml = r#"<rubriques><rubrique><id>a</id>
            <texte>Voir &lt;doc12|center&gt; et {{gras}}</texte>
        </rubrique></rubriques>"#;
        let items = extract_items(xml, "rubrique", 0);
        assert_eq!(
            items[0].field("texte").map(str::trim),
            Some("Voir <doc12|center> et {{gras}}")
        );
    }

    #[test]
    fn non_empty_field_filters_blank() {
        let xml = "<r><rubrique><id>a</id><logourl>  </logourl></rubrique></r>";
        let items = extract_items(xml, "rubrique", 0);
        assert_eq!(items[0].non_empty_field("logourl"), None);
        assert_eq!(items[0].field("logourl"), Some("  "));
    }
}
