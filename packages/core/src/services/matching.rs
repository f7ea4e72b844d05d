//! Relation Matching
//!
//! Decides which of a resource's relation rows belong to which reference
//! field. A link matches a descriptor when the partner role matches the
//! descriptor role (default `Target`) and one of three rules applies, in
//! this order of intent:
//!
//! 1. *Typed, optionally named*: the descriptor declares the same kind as
//!    the row, and either no name is configured or the names are equal.
//! 2. *Custom, named*: the descriptor declares the `Custom` kind and its
//!    configured name equals the row name.
//! 3. *Undecorated, name-only*: the field name itself equals the row name,
//!    regardless of kind.
//!
//! The fallback chain lets one deployment mix strongly typed relations,
//! custom named relations and convention-based ones in the same schema.
//! Single-reference fields are expected to match at most one row; for
//! collections every qualifying row belongs to the field.

use crate::models::{RelationKind, RelationLink};
use crate::registry::ReferenceDescriptor;

/// Returns the links that logically belong to `descriptor`.
pub fn matching_links<'a>(
    links: &'a [RelationLink],
    descriptor: &ReferenceDescriptor,
) -> Vec<&'a RelationLink> {
    links
        .iter()
        .filter(|link| link.role == descriptor.role() && name_or_kind_matches(link, descriptor))
        .collect()
}

fn name_or_kind_matches(link: &RelationLink, descriptor: &ReferenceDescriptor) -> bool {
    let spec = descriptor.relation.as_ref();

    let typed = spec.is_some_and(|s| {
        s.kind == link.kind && (s.name.is_none() || s.name == link.name)
    });
    let custom = spec.is_some_and(|s| s.kind == RelationKind::Custom && s.name == link.name);
    let undecorated = link.name.as_deref() == Some(descriptor.field.as_str());

    typed || custom || undecorated
}
