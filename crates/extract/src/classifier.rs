use std::collections::BTreeMap;

use types::{
    ClassifierRules, Feature, GeometryKind, LayerRule, OsmNode, OsmWay, PropertyValue, Tags,
};

use crate::node_lookup::NodeLookup;

/// Layer and properties assigned to an included element.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub layer: String,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Closed ways become polygons instead of lines.
    pub area: bool,
}

/// Decides which elements become features and how they are labelled.
///
/// Implementations must be deterministic: the resolver passes and the
/// generation pass call the same predicates on the same tags and rely on
/// getting the same answers.
pub trait Classifier: Send + Sync {
    fn node_included(&self, tags: &Tags) -> bool;
    fn way_included(&self, tags: &Tags) -> bool;
    fn relation_included(&self, tags: &Tags) -> bool;
    fn process_node(&self, tags: &Tags, id: i64) -> Option<Classification>;
    fn process_way(&self, tags: &Tags) -> Option<Classification>;
}

/// Table driven [`Classifier`] configured by [`ClassifierRules`].
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    rules: ClassifierRules,
}

impl RuleClassifier {
    pub fn new(rules: ClassifierRules) -> Self {
        RuleClassifier { rules }
    }
}

fn rule_matches(rule: &LayerRule, tags: &Tags) -> bool {
    rule.filters.iter().any(|(key, value)| match (tags.get(key), value) {
        (Some(_), None) => true,
        (Some(actual), Some(expected)) => actual == expected,
        (None, _) => false,
    })
}

fn first_match<'a>(rules: &'a [LayerRule], tags: &Tags) -> Option<&'a LayerRule> {
    rules.iter().find(|rule| rule_matches(rule, tags))
}

fn classify(rule: &LayerRule, tags: &Tags, id: Option<i64>) -> Classification {
    let mut properties: BTreeMap<String, PropertyValue> = rule
        .properties
        .iter()
        .filter_map(|(key, renamed)| {
            let value = tags.get(key)?;
            let name = renamed.as_deref().unwrap_or(key).to_owned();
            Some((name, PropertyValue::from(value.as_str())))
        })
        .collect();

    if let (true, Some(id)) = (rule.include_id, id) {
        properties.insert("id".to_owned(), PropertyValue::String(id.to_string()));
    }

    Classification {
        layer: rule.layer.clone(),
        properties,
        area: rule.area,
    }
}

impl Classifier for RuleClassifier {
    fn node_included(&self, tags: &Tags) -> bool {
        first_match(&self.rules.nodes, tags).is_some()
    }

    fn way_included(&self, tags: &Tags) -> bool {
        first_match(&self.rules.ways, tags).is_some()
    }

    fn relation_included(&self, tags: &Tags) -> bool {
        first_match(&self.rules.relations, tags).is_some()
    }

    fn process_node(&self, tags: &Tags, id: i64) -> Option<Classification> {
        first_match(&self.rules.nodes, tags).map(|rule| classify(rule, tags, Some(id)))
    }

    fn process_way(&self, tags: &Tags) -> Option<Classification> {
        first_match(&self.rules.ways, tags).map(|rule| classify(rule, tags, None))
    }
}

/// Builds the point feature of an included node.
pub fn node_feature<C: Classifier + ?Sized>(classifier: &C, node: &OsmNode) -> Option<Feature> {
    if !classifier.node_included(&node.tags) {
        return None;
    }
    let classification = classifier.process_node(&node.tags, node.id)?;

    Some(Feature {
        id: node.id,
        kind: GeometryKind::Point,
        layer: classification.layer,
        coordinates: vec![node.coordinate],
        properties: classification.properties,
    })
}

/// A way feature together with the node references that could not be resolved.
#[derive(Debug, Clone)]
pub struct ResolvedWay {
    pub feature: Option<Feature>,
    pub missing: Vec<i64>,
}

/// Builds the line or polygon feature of an included way. Unresolved
/// references are skipped; a way left without coordinates yields no feature.
pub fn way_feature<C: Classifier + ?Sized>(
    classifier: &C,
    way: &OsmWay,
    lookup: &NodeLookup,
) -> Option<ResolvedWay> {
    if !classifier.way_included(&way.tags) {
        return None;
    }
    let classification = classifier.process_way(&way.tags)?;
    let resolved = lookup.resolve(&way.node_ids);

    let kind = if classification.area && way.is_closed() && resolved.missing.is_empty() {
        GeometryKind::Polygon
    } else {
        GeometryKind::Line
    };

    let feature = (!resolved.coordinates.is_empty()).then(|| Feature {
        id: way.id,
        kind,
        layer: classification.layer,
        coordinates: resolved.coordinates,
        properties: classification.properties,
    });

    Some(ResolvedWay {
        feature,
        missing: resolved.missing,
    })
}
