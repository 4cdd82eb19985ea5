use html5ever::{namespace_url, ns, LocalName, QualName};
use kuchikiki::traits::TendrilSink;
use kuchikiki::{Attribute, ExpandedName, NodeRef};
use mailshelter_error::ShelterError;

pub fn parse(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

/// Detach every node matching `selector`; returns how many were removed.
pub fn remove_all(doc: &NodeRef, selector: &str) -> Result<usize, ShelterError> {
    let nodes: Vec<NodeRef> = doc
        .select(selector)
        .map_err(|_| ShelterError::compose(format!("invalid selector '{selector}'")))?
        .map(|m| m.as_node().clone())
        .collect();
    for node in &nodes {
        node.detach();
    }
    Ok(nodes.len())
}

pub fn select_first(doc: &NodeRef, selector: &str) -> Result<Option<NodeRef>, ShelterError> {
    Ok(doc
        .select(selector)
        .map_err(|_| ShelterError::compose(format!("invalid selector '{selector}'")))?
        .next()
        .map(|m| m.as_node().clone()))
}

pub fn new_element<'a, I>(name: &str, attrs: I) -> NodeRef
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    NodeRef::new_element(
        QualName::new(None, ns!(html), LocalName::from(name)),
        attrs.into_iter().map(|(k, v)| {
            (
                ExpandedName::new(ns!(), LocalName::from(k)),
                Attribute {
                    prefix: None,
                    value: v,
                },
            )
        }),
    )
}

/// The `<head>` element, which the html5ever tree builder guarantees exists
/// for any parsed document.
pub fn head(doc: &NodeRef) -> Result<NodeRef, ShelterError> {
    select_first(doc, "head")?
        .ok_or_else(|| ShelterError::compose("document has no <head>"))
}

pub fn serialize(doc: &NodeRef) -> Result<Vec<u8>, ShelterError> {
    let mut out = Vec::new();
    doc.serialize(&mut out)
        .map_err(|e| ShelterError::compose(format!("serialize: {e}")))?;
    Ok(out)
}
