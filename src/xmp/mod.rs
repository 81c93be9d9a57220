//! `dc:description` inside an XMP packet.
//!
//! [`extract_description`] never fails: anything unreadable is an empty
//! description. [`build_xmp_xml`] always yields a well-formed packet; it
//! edits an existing packet in place when it can and synthesizes a fresh one
//! when there is nothing usable to edit.

mod dom;

use quick_xml::escape::escape;

use dom::{Document, Element, Node};

pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const X_NS: &str = "adobe:ns:meta/";

/// Packet id every XMP writer uses in `<?xpacket begin?>`.
pub const PACKET_ID: &str = "W5M0MpCehiHzreSzNTczkc9d";

/// Spaces reserved after the packet body for in-place growth.
pub const PADDING_LEN: usize = 2048;

const DEFAULT_LANG: &str = "x-default";

/// The `dc:description` of a packet, or `""` when it has none.
///
/// The `x-default` alternative wins; otherwise the first `rdf:li`, otherwise
/// the raw text of the property.
pub fn extract_description(xmp: &str) -> String {
    match dom::parse(xmp) {
        Ok(document) => description_of(&document.root).unwrap_or_default(),
        Err(err) => {
            log::debug!("ignoring unreadable XMP packet: {err}");
            String::new()
        }
    }
}

fn description_of(root: &Element) -> Option<String> {
    let property = root.find(DC_NS, "description")?;
    let items = property.descendants(RDF_NS, "li");
    let Some(first) = items.first() else {
        return Some(property.text());
    };
    let item = items
        .iter()
        .find(|li| li.attribute("xml:lang") == Some(DEFAULT_LANG))
        .unwrap_or(first);
    Some(item.text())
}

/// A packet carrying `description`, merged into `existing` when possible.
///
/// The text is stored verbatim. Control characters that XML 1.0 forbids
/// (U+0001 to U+0008, U+000B, U+000C, U+000E to U+001F) are written as-is:
/// this crate reads them back, stricter XML parsers reject the packet.
///
/// ```rust
/// use xmp_caption::xmp::{build_xmp_xml, extract_description};
///
/// let packet = build_xmp_xml(None, "Harbour at dawn");
/// assert_eq!(extract_description(&packet), "Harbour at dawn");
///
/// let updated = build_xmp_xml(Some(&packet), "Harbour at dusk");
/// assert_eq!(extract_description(&updated), "Harbour at dusk");
/// ```
pub fn build_xmp_xml(existing: Option<&str>, description: &str) -> String {
    let Some(existing) = existing else {
        return synthesize(description);
    };
    let mut document = match dom::parse(existing) {
        Ok(document) => document,
        Err(err) => {
            log::debug!("replacing unreadable XMP packet: {err}");
            return synthesize(description);
        }
    };
    if !set_description(&mut document.root, description) {
        log::debug!("XMP packet has no rdf:Description; synthesizing a new one");
        return synthesize(description);
    }
    serialize_packet(&document)
}

/// Apply `description` to the tree. `false` when there is no `rdf:Description` to hold it.
fn set_description(root: &mut Element, description: &str) -> bool {
    let rdf_prefix = rdf_prefix(root);

    if let Some(property) = root.find_mut(DC_NS, "description") {
        let target = {
            let items = property.descendants(RDF_NS, "li");
            if items.is_empty() {
                None
            } else {
                let index = items
                    .iter()
                    .position(|li| li.attribute("xml:lang") == Some(DEFAULT_LANG))
                    .unwrap_or(0);
                Some(index)
            }
        };
        match target.and_then(|index| property.descendant_mut(RDF_NS, "li", index)) {
            Some(item) => item.set_text(description),
            None => {
                property.children = vec![Node::Element(alt(rdf_prefix.as_deref(), description))];
            }
        }
        return true;
    }

    let Some(holder) = root.find_mut(RDF_NS, "Description") else {
        return false;
    };
    let property = Element::new("dc:description", DC_NS)
        .with_child(Node::Element(alt(rdf_prefix.as_deref(), description)));
    let declared = holder.attribute("xmlns:dc").map(|uri| uri == DC_NS);
    let property = match declared {
        Some(true) => property,
        None if !uses_foreign_dc(holder) => {
            holder.attributes.push(("xmlns:dc".to_string(), DC_NS.to_string()));
            property
        }
        // `dc` means something else here; bind it on the new element only.
        _ => property.with_attribute("xmlns:dc", DC_NS),
    };
    holder.children.push(Node::Element(property));
    true
}

/// Whether `element` or anything below it may use the `dc` prefix for another namespace.
///
/// Attribute namespaces are not resolved, so any `dc:` attribute counts.
fn uses_foreign_dc(element: &Element) -> bool {
    (element.prefix() == Some("dc") && element.namespace.as_deref() != Some(DC_NS))
        || element.attributes.iter().any(|(key, _)| key.starts_with("dc:"))
        || element.child_elements().any(uses_foreign_dc)
}

/// Prefix the packet already uses for RDF; `None` when RDF is the default namespace.
fn rdf_prefix(root: &Element) -> Option<String> {
    let rdf = root
        .find(RDF_NS, "Description")
        .or_else(|| root.find(RDF_NS, "RDF"));
    match rdf {
        Some(element) => element.prefix().map(str::to_string),
        None => Some("rdf".to_string()),
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// `rdf:Alt` holding one `x-default` item.
fn alt(rdf_prefix: Option<&str>, description: &str) -> Element {
    let item = Element::new(qualified(rdf_prefix, "li"), RDF_NS)
        .with_attribute("xml:lang", DEFAULT_LANG)
        .with_child(Node::Text(description.to_string()));
    Element::new(qualified(rdf_prefix, "Alt"), RDF_NS).with_child(Node::Element(item))
}

fn serialize_packet(document: &Document) -> String {
    if document.has_packet_wrapper() {
        document.to_xml()
    } else {
        wrap_packet(&document.root.to_xml())
    }
}

/// Surround `body` with the `xpacket` instructions and padding.
fn wrap_packet(body: &str) -> String {
    let padding = " ".repeat(PADDING_LEN);
    format!("<?xpacket begin=\"\u{feff}\" id=\"{PACKET_ID}\"?>\n{body}\n{padding}\n")
        + "<?xpacket end=\"w\"?>"
}

/// A minimal packet holding only `description`.
fn synthesize(description: &str) -> String {
    let mut body = String::new();
    body.push_str(&format!("<x:xmpmeta xmlns:x=\"{X_NS}\">\n"));
    body.push_str(&format!(" <rdf:RDF xmlns:rdf=\"{RDF_NS}\">\n"));
    body.push_str(&format!("  <rdf:Description rdf:about=\"\" xmlns:dc=\"{DC_NS}\">\n"));
    body.push_str("   <dc:description>\n");
    body.push_str("    <rdf:Alt>\n");
    body.push_str(&format!(
        "     <rdf:li xml:lang=\"{DEFAULT_LANG}\">{}</rdf:li>\n",
        escape(description)
    ));
    body.push_str("    </rdf:Alt>\n");
    body.push_str("   </dc:description>\n");
    body.push_str("  </rdf:Description>\n");
    body.push_str(" </rdf:RDF>\n");
    body.push_str("</x:xmpmeta>");
    wrap_packet(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTOSHOP_PACKET: &str = r#"<?xpacket begin="﻿" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/" x:xmptk="Adobe XMP Core 5.6-c140">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmp:CreatorTool="Adobe Photoshop CC 2019">
   <dc:format>image/jpeg</dc:format>
   <dc:description>
    <rdf:Alt>
     <rdf:li xml:lang="de-DE">Hafen</rdf:li>
     <rdf:li xml:lang="x-default">Harbour</rdf:li>
    </rdf:Alt>
   </dc:description>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>

<?xpacket end="w"?>"#;

    fn rdf_only(description_body: &str) -> String {
        let meta = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">"#;
        format!(r#"{meta}<rdf:RDF xmlns:rdf="{RDF_NS}">{description_body}</rdf:RDF></x:xmpmeta>"#)
    }

    // ── synthesis ────────────────────────────────────────────────────

    #[test]
    fn synthesized_packet_shape() {
        let packet = build_xmp_xml(None, "hello");

        assert!(
            packet.starts_with("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>")
        );
        assert!(packet.ends_with("<?xpacket end=\"w\"?>"));
        assert!(packet.contains(r#"<rdf:li xml:lang="x-default">hello</rdf:li>"#));
        assert!(packet.contains(&format!("\n{}\n", " ".repeat(PADDING_LEN))));
        assert!(!packet.contains(&" ".repeat(PADDING_LEN + 1)));

        let document = dom::parse(&packet).unwrap();
        assert!(document.root.is(X_NS, "xmpmeta"));
        assert_eq!(extract_description(&packet), "hello");
    }

    #[test]
    fn synthesized_packet_escapes_markup() {
        let text = r#"5 < 6 & "quotes" 'too' > done"#;
        let packet = build_xmp_xml(None, text);
        assert!(!packet.contains("5 < 6"));
        assert_eq!(extract_description(&packet), text);
    }

    #[test]
    fn unreadable_packet_is_replaced() {
        let packet = build_xmp_xml(Some("<x:xmpmeta><broken"), "fresh");
        assert_eq!(packet, build_xmp_xml(None, "fresh"));
    }

    #[test]
    fn packet_without_rdf_description_is_replaced() {
        let packet = build_xmp_xml(Some(r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"/>"#), "fresh");
        assert_eq!(packet, build_xmp_xml(None, "fresh"));
    }

    // ── merging ──────────────────────────────────────────────────────

    #[test]
    fn updates_x_default_item_and_keeps_the_rest() {
        let packet = build_xmp_xml(Some(PHOTOSHOP_PACKET), "Harbour at night");

        assert_eq!(extract_description(&packet), "Harbour at night");
        assert!(packet.contains(r#"<rdf:li xml:lang="de-DE">Hafen</rdf:li>"#));
        assert!(packet.contains("<dc:format>image/jpeg</dc:format>"));
        assert!(packet.contains(r#"xmp:CreatorTool="Adobe Photoshop CC 2019""#));
        assert!(packet.contains(r#"x:xmptk="Adobe XMP Core 5.6-c140""#));
    }

    #[test]
    fn existing_envelope_and_padding_are_preserved() {
        let packet = build_xmp_xml(Some(PHOTOSHOP_PACKET), "Harbour");
        assert_eq!(packet, PHOTOSHOP_PACKET);
    }

    #[test]
    fn updates_first_item_without_x_default() {
        let existing = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
            r#"<dc:description><rdf:Alt><rdf:li xml:lang="en">one</rdf:li>"#,
            r#"<rdf:li xml:lang="fr">deux</rdf:li></rdf:Alt></dc:description>"#,
            "</rdf:Description>",
        ));
        let packet = build_xmp_xml(Some(&existing), "uno");
        assert!(packet.contains(r#"<rdf:li xml:lang="en">uno</rdf:li>"#));
        assert!(packet.contains(r#"<rdf:li xml:lang="fr">deux</rdf:li>"#));
        assert_eq!(extract_description(&packet), "uno");
    }

    #[test]
    fn rebuilds_description_without_items() {
        let existing = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
            r#"<dc:description>plain <b xmlns="urn:x">old</b></dc:description>"#,
            "</rdf:Description>",
        ));
        let packet = build_xmp_xml(Some(&existing), "new");
        assert!(packet.contains(concat!(
            r#"<dc:description><rdf:Alt><rdf:li xml:lang="x-default">new</rdf:li>"#,
            "</rdf:Alt></dc:description>",
        )));
        assert!(!packet.contains("old"));
    }

    #[test]
    fn appends_description_and_declares_dc() {
        let existing = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/""#,
            r#" xmp:Rating="3"/>"#,
        ));
        let packet = build_xmp_xml(Some(&existing), "added");

        assert!(packet.contains(r#"xmlns:dc="http://purl.org/dc/elements/1.1/""#));
        assert!(packet.contains(r#"xmp:Rating="3""#));
        assert!(packet.contains(
            r#"<dc:description><rdf:Alt><rdf:li xml:lang="x-default">added</rdf:li>"#
        ));
        assert_eq!(extract_description(&packet), "added");
    }

    #[test]
    fn existing_dc_declaration_is_not_duplicated() {
        let existing = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
            "<dc:title>t</dc:title></rdf:Description>",
        ));
        let packet = build_xmp_xml(Some(&existing), "d");
        assert_eq!(packet.matches("xmlns:dc=").count(), 1);
        assert_eq!(extract_description(&packet), "d");
    }

    #[test]
    fn foreign_dc_binding_on_holder_is_not_reused() {
        let existing = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:dc="urn:not-dublin-core">"#,
            "<dc:title>t</dc:title></rdf:Description>",
        ));
        let packet = build_xmp_xml(Some(&existing), "hello");

        assert!(packet.contains(r#"xmlns:dc="urn:not-dublin-core""#));
        assert!(packet.contains(
            r#"<dc:description xmlns:dc="http://purl.org/dc/elements/1.1/"><rdf:Alt>"#
        ));
        assert_eq!(extract_description(&packet), "hello");
        assert_eq!(build_xmp_xml(Some(&packet), "hello"), packet);
    }

    #[test]
    fn foreign_dc_binding_inherited_by_holder_is_not_shadowed() {
        let existing = concat!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">"#,
            r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#""#,
            r#" xmlns:dc="urn:other">"#,
            r#"<rdf:Description rdf:about=""><dc:title>kept</dc:title></rdf:Description>"#,
            "</rdf:RDF></x:xmpmeta>",
        );
        let packet = build_xmp_xml(Some(existing), "caption");

        assert!(packet.contains(r#"<rdf:Description rdf:about=""><dc:title>kept</dc:title>"#));
        assert!(packet.contains(r#"<dc:description xmlns:dc="http://purl.org/dc/elements/1.1/">"#));
        assert_eq!(extract_description(&packet), "caption");

        let document = dom::parse(&packet).unwrap();
        assert_eq!(document.root.find("urn:other", "title").unwrap().text(), "kept");
    }

    #[test]
    fn unusual_rdf_prefix_is_reused() {
        let existing = concat!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">"#,
            r#"<r:RDF xmlns:r="http://www.w3.org/1999/02/22-rdf-syntax-ns#">"#,
            r#"<r:Description r:about=""/></r:RDF></x:xmpmeta>"#,
        );
        let packet = build_xmp_xml(Some(existing), "prefixed");
        assert!(packet.contains(r#"<r:Alt><r:li xml:lang="x-default">prefixed</r:li></r:Alt>"#));
        assert_eq!(extract_description(&packet), "prefixed");
    }

    #[test]
    fn bare_rdf_packet_gets_wrapped() {
        let existing = rdf_only(r#"<rdf:Description rdf:about=""/>"#);
        let packet = build_xmp_xml(Some(&existing), "wrapped");
        assert!(packet.starts_with("<?xpacket begin="));
        assert!(packet.ends_with("<?xpacket end=\"w\"?>"));
        assert!(packet.contains(&" ".repeat(PADDING_LEN)));
    }

    #[test]
    fn merge_is_idempotent_for_any_text() {
        let texts = [
            "",
            "plain ascii",
            "  leading and trailing  ",
            "multi\nline",
            "<&>\"'",
            "ünïcödé · 日本語 🌅",
            "]]> and &amp; literally",
        ];
        for text in texts {
            let fresh = build_xmp_xml(None, text);
            assert_eq!(extract_description(&fresh), text, "fresh {text:?}");

            let merged = build_xmp_xml(Some(PHOTOSHOP_PACKET), text);
            assert_eq!(extract_description(&merged), text, "merged {text:?}");

            let remerged = build_xmp_xml(Some(&merged), text);
            assert_eq!(remerged, merged);
        }
    }

    #[test]
    fn control_characters_are_kept_verbatim() {
        let text = "bell\u{7} and tab\tend";
        let packet = build_xmp_xml(None, text);
        assert!(packet.contains('\u{7}'));
        assert_eq!(extract_description(&packet), text);

        let merged = build_xmp_xml(Some(PHOTOSHOP_PACKET), text);
        assert_eq!(extract_description(&merged), text);
    }

    // ── extraction ───────────────────────────────────────────────────

    #[test]
    fn extract_prefers_x_default() {
        assert_eq!(extract_description(PHOTOSHOP_PACKET), "Harbour");
    }

    #[test]
    fn extract_falls_back_to_raw_text() {
        let packet = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
            "<dc:description>just text</dc:description></rdf:Description>",
        ));
        assert_eq!(extract_description(&packet), "just text");
    }

    #[test]
    fn extract_from_unusable_input_is_empty() {
        assert_eq!(extract_description(""), "");
        assert_eq!(extract_description("not xml at all"), "");
        assert_eq!(extract_description("<a><b></a>"), "");
        assert_eq!(extract_description(&rdf_only(r#"<rdf:Description rdf:about=""/>"#)), "");
    }

    #[test]
    fn extract_matches_namespace_not_prefix() {
        let packet = rdf_only(concat!(
            r#"<rdf:Description rdf:about="" xmlns:d="http://purl.org/dc/elements/1.1/""#,
            r#" xmlns:dc="urn:not-dublin-core">"#,
            "<dc:description>wrong</dc:description><d:description>right</d:description>",
            "</rdf:Description>",
        ));
        assert_eq!(extract_description(&packet), "right");
    }
}
