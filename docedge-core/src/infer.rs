//! Relation inference from schema references.
//!
//! While a resource's schema is converted, every root-level reference field is reported to a
//! [`RelationInferencer`], which records the forward relation and, when the reference is
//! paired, its inverse. A resource pair is related at most once: if any relation already
//! joins the two resources, in either direction, further references between them are skipped.

use tracing::{debug, trace};

use crate::{
    registry::{Cardinality, KeyField, Relation, RegistryState, Resolution},
    schema::{Reference, RelationKind},
};

struct Target {
    name: String,
    id_field: KeyField,
    lazy: bool,
}

/// Records relations declared by one resource's schema.
pub struct RelationInferencer<'a> {
    state: &'a mut RegistryState,
    owner: String,
}

impl<'a> RelationInferencer<'a> {
    pub fn new(state: &'a mut RegistryState, owner: impl Into<String>) -> Self {
        RelationInferencer { state, owner: owner.into() }
    }

    fn target(&self, reference: &Reference) -> Option<Target> {
        let name = reference.target.clone();

        match self.state.resolve(&name) {
            Resolution::Registered(info) => Some(Target {
                id_field: KeyField::Field(info.id_field.clone()),
                name,
                lazy: false,
            }),
            Resolution::Lazy => Some(Target {
                id_field: KeyField::Pending { awaiting: name.clone() },
                name,
                lazy: true,
            }),
            Resolution::Unknown => {
                debug!(owner = %self.owner, target = %name, "Skipping reference to unknown resource");
                None
            }
        }
    }

    fn already_related(&self, target: &Target) -> bool {
        let related = self.state.connected(&self.owner, &target.name);
        if related {
            trace!(owner = %self.owner, target = %target.name, "Resources already related");
        }
        related
    }

    /// A singular reference: `field` holds one identifier of the target.
    pub fn reference(&mut self, field: &str, reference: &Reference) {
        let Some(target) = self.target(reference) else { return };
        if self.already_related(&target) {
            return;
        }

        let meta = &reference.relation;
        let name = meta.name.clone().unwrap_or_else(|| field.to_string());
        let paired = meta.kind != Some(RelationKind::OneToOne);

        self.state.add_relation(Relation {
            from: self.owner.clone(),
            to: target.name.clone(),
            relation_key: KeyField::Field(field.to_string()),
            related_key: target.id_field.clone(),
            cardinality: Cardinality::OneToOne,
            name: Some(name.clone()),
            pair_name: if paired { meta.foreign_name.clone() } else { None },
            has_pair: paired,
            resolved_lazily: target.lazy,
        });

        if paired {
            self.state.add_relation(Relation {
                from: target.name,
                to: self.owner.clone(),
                relation_key: target.id_field,
                related_key: KeyField::Field(field.to_string()),
                cardinality: Cardinality::OneToMany,
                name: meta.foreign_name.clone(),
                pair_name: Some(name),
                has_pair: true,
                resolved_lazily: target.lazy,
            });
        }
    }

    /// An array reference: `field` holds a list of identifiers of the target.
    pub fn reference_array(&mut self, field: &str, reference: &Reference) {
        let Some(target) = self.target(reference) else { return };
        if self.already_related(&target) {
            return;
        }

        let meta = &reference.relation;
        let name = meta.name.clone().unwrap_or_else(|| field.to_string());
        let has_pair = meta.kind != Some(RelationKind::ManyToOne);

        self.state.add_relation(Relation {
            from: self.owner.clone(),
            to: target.name.clone(),
            relation_key: KeyField::Field(field.to_string()),
            related_key: target.id_field.clone(),
            cardinality: Cardinality::OneToMany,
            name: Some(name.clone()),
            pair_name: meta.foreign_name.clone(),
            has_pair,
            resolved_lazily: target.lazy,
        });

        self.state.add_relation(Relation {
            from: target.name,
            to: self.owner.clone(),
            relation_key: target.id_field,
            related_key: KeyField::Field(field.to_string()),
            cardinality: if has_pair { Cardinality::OneToMany } else { Cardinality::OneToOne },
            name: meta.foreign_name.clone(),
            pair_name: Some(name),
            has_pair,
            resolved_lazily: target.lazy,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registry::{ResourceRegistry, tests::info},
        schema::RelationMeta,
    };

    fn reference(target: &str, meta: RelationMeta) -> Reference {
        Reference { target: target.to_string(), relation: meta }
    }

    #[tokio::test]
    async fn singular_reference_records_forward_and_inverse() {
        let registry = ResourceRegistry::new();
        registry.register(info("user")).await.unwrap();

        registry
            .register_with(info("pet"), |state| {
                RelationInferencer::new(state, "pet")
                    .reference("owner", &reference("user", RelationMeta::default().foreign_name("pets")));
            })
            .await
            .unwrap();

        let relations = registry.relations().await;
        assert_eq!(relations.len(), 2);

        let forward = &relations[0];
        assert_eq!((forward.from.as_str(), forward.to.as_str()), ("pet", "user"));
        assert_eq!(forward.cardinality, Cardinality::OneToOne);
        assert_eq!(forward.relation_key, KeyField::Field("owner".into()));
        assert_eq!(forward.related_key, KeyField::Field("id".into()));
        assert_eq!(forward.name.as_deref(), Some("owner"));

        let inverse = &relations[1];
        assert_eq!((inverse.from.as_str(), inverse.to.as_str()), ("user", "pet"));
        assert_eq!(inverse.cardinality, Cardinality::OneToMany);
        assert_eq!(inverse.name.as_deref(), Some("pets"));
        assert_eq!(inverse.related_key, KeyField::Field("owner".into()));
    }

    #[tokio::test]
    async fn one_to_one_reference_has_no_inverse() {
        let registry = ResourceRegistry::new();

        registry
            .register_with(info("profile"), |state| {
                RelationInferencer::new(state, "profile").reference(
                    "account",
                    &reference("account", RelationMeta::default().kind(RelationKind::OneToOne)),
                );
            })
            .await
            .unwrap();

        let relations = registry.relations().await;
        assert_eq!(relations.len(), 1);
        assert!(!relations[0].has_pair);
        assert_eq!(relations[0].related_key, KeyField::Pending { awaiting: "account".into() });
    }

    #[tokio::test]
    async fn many_to_one_array_inverse_is_one_to_one() {
        let registry = ResourceRegistry::new();

        registry
            .register_with(info("team"), |state| {
                RelationInferencer::new(state, "team").reference_array(
                    "members",
                    &reference("user", RelationMeta::default().kind(RelationKind::ManyToOne)),
                );
            })
            .await
            .unwrap();

        let relations = registry.relations().await;
        assert_eq!(relations[0].cardinality, Cardinality::OneToMany);
        assert!(!relations[0].has_pair);
        assert_eq!(relations[1].cardinality, Cardinality::OneToOne);
    }

    #[tokio::test]
    async fn second_reference_between_same_pair_is_skipped() {
        let registry = ResourceRegistry::new();

        registry
            .register_with(info("message"), |state| {
                let mut inferencer = RelationInferencer::new(state, "message");
                inferencer.reference("sender", &reference("user", RelationMeta::default()));
                inferencer.reference("recipient", &reference("user", RelationMeta::default()));
            })
            .await
            .unwrap();

        assert_eq!(registry.relations().await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_targets_are_skipped_without_lazy_resolution() {
        let registry = ResourceRegistry::builder().lazy_resolution(false).build();

        registry
            .register_with(info("pet"), |state| {
                RelationInferencer::new(state, "pet").reference("owner", &reference("user", RelationMeta::default()));
            })
            .await
            .unwrap();

        assert!(registry.relations().await.is_empty());
    }
}
