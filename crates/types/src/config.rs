use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TileMakerConfig {
    pub zoom: u8,
    pub extent: u32,
    pub name: String,
    pub description: String,
    pub queue_len: usize,
    pub classifier: ClassifierRules,
}

impl Default for TileMakerConfig {
    fn default() -> Self {
        TileMakerConfig {
            zoom: 16,
            extent: 4096,
            name: "pace".to_owned(),
            description: "pacetiles".to_owned(),
            queue_len: 1000,
            classifier: ClassifierRules::default(),
        }
    }
}

/// One classification rule. It matches when any of its `filters` matches: a
/// filter is a tag key plus an optional required value. `properties` copies
/// tags into the feature, optionally under a new key.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LayerRule {
    pub layer: String,
    pub filters: Vec<(String, Option<String>)>,
    #[serde(default)]
    pub properties: Vec<(String, Option<String>)>,
    #[serde(default)]
    pub include_id: bool,
    #[serde(default)]
    pub area: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierRules {
    pub nodes: Vec<LayerRule>,
    pub ways: Vec<LayerRule>,
    pub relations: Vec<LayerRule>,
}

const ROAD_1_HIGHWAYS: &[&str] = &[
    "residential",
    "unclassified",
    "tertiary",
    "secondary",
    "primary",
    "living_street",
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary_link",
    "motorway_junction",
    "tertiary_link",
];
const ROAD_2_HIGHWAYS: &[&str] = &[
    "service",
    "turning_cycle",
    "turning_loop",
    "mini_roundabout",
    "raceway",
    "rest_area",
    "services",
];
const ROAD_3_HIGHWAYS: &[&str] = &["passing_place", "construction"];

const WAY_PROPERTIES: &[(&str, &str)] = &[
    ("addr:housenumber", "hn"),
    ("addr:street", "st"),
    ("highway", "hw"),
    ("name", "nm"),
    ("ref", "rf"),
    ("lanes", "ln"),
    ("maxspeed", "ms"),
    ("overtaking", "ot"),
    ("oneway", "ow"),
];

fn renamed(properties: &[(&str, &str)]) -> Vec<(String, Option<String>)> {
    properties
        .iter()
        .map(|(key, short)| (key.to_string(), Some(short.to_string())))
        .collect()
}

fn highway_rule(layer: &str, highways: &[&str]) -> LayerRule {
    LayerRule {
        layer: layer.to_owned(),
        filters: highways
            .iter()
            .map(|value| ("highway".to_owned(), Some(value.to_string())))
            .collect(),
        properties: renamed(WAY_PROPERTIES),
        include_id: false,
        area: false,
    }
}

impl Default for ClassifierRules {
    /// Roads in four classes, house numbers and speed cameras.
    fn default() -> Self {
        let nodes = vec![
            LayerRule {
                layer: "hn".to_owned(),
                filters: vec![("addr:housenumber".to_owned(), None)],
                properties: renamed(&[
                    ("name", "nm"),
                    ("addr:housenumber", "hn"),
                    ("addr:street", "st"),
                ]),
                include_id: true,
                area: false,
            },
            LayerRule {
                layer: "pi".to_owned(),
                filters: vec![("highway".to_owned(), Some("speed_camera".to_owned()))],
                properties: renamed(&[("name", "nm"), ("highway", "hw"), ("maxspeed", "ms")]),
                include_id: true,
                area: false,
            },
        ];

        let ways = vec![
            highway_rule("r1", ROAD_1_HIGHWAYS),
            highway_rule("r2", ROAD_2_HIGHWAYS),
            highway_rule("r3", ROAD_3_HIGHWAYS),
            LayerRule {
                layer: "r4".to_owned(),
                filters: vec![("highway".to_owned(), None)],
                properties: renamed(WAY_PROPERTIES),
                include_id: false,
                area: false,
            },
            LayerRule {
                layer: "hn".to_owned(),
                filters: vec![("addr:housenumber".to_owned(), None)],
                properties: renamed(WAY_PROPERTIES),
                include_id: false,
                area: false,
            },
        ];

        ClassifierRules {
            nodes,
            ways,
            relations: Vec::new(),
        }
    }
}
