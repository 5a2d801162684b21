//! Static chilli disease catalog
//!
//! Maps the class index emitted by the vision model to the text shown to
//! growers. The table is compiled in and never changes at runtime; every
//! index the model can emit resolves to an entry, and anything outside the
//! table resolves to [`UNKNOWN_CLASS`].

use serde::Serialize;

/// Human-facing content for one model output class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassEntry {
    /// Short disease (or healthy) label
    pub name: &'static str,

    /// What the grower is looking at
    pub description: &'static str,

    /// What to do about it
    pub advice: &'static str,

    /// Illustrative picture, relative to the public static asset root
    pub image: Option<&'static str>,

    /// Further reading
    pub reference_url: Option<&'static str>,
}

/// Entry returned for indices the catalog does not know
pub const UNKNOWN_CLASS: ClassEntry = ClassEntry {
    name: "unknown class",
    description: "The model produced a result that is not in the disease catalog.",
    advice: "Please send another photo of a single leaf or fruit, or ask an agronomist to take a look.",
    image: None,
    reference_url: None,
};

const CHILLI_CLASSES: [ClassEntry; 7] = [
    ClassEntry {
        name: "Healthy",
        description: "Leaves and fruit look healthy. No sign of disease was detected.",
        advice: "Keep up regular watering and balanced fertilising, and keep checking the plants weekly.",
        image: Some("catalog/healthy.jpg"),
        reference_url: None,
    },
    ClassEntry {
        name: "Anthracnose",
        description: "Sunken, water-soaked spots on the fruit that turn dark with orange or black spore rings, caused by Colletotrichum fungi.",
        advice: "Remove and destroy infected fruit, avoid overhead irrigation, and apply a registered fungicide such as mancozeb or azoxystrobin.",
        image: Some("catalog/anthracnose.jpg"),
        reference_url: Some("https://en.wikipedia.org/wiki/Anthracnose"),
    },
    ClassEntry {
        name: "Cercospora Leaf Spot",
        description: "Round leaf spots with pale grey centres and dark brown margins (frog-eye spots); heavy infection makes leaves drop.",
        advice: "Pick off spotted leaves, improve spacing for airflow, and spray a copper or chlorothalonil fungicide at 7-10 day intervals.",
        image: Some("catalog/cercospora.jpg"),
        reference_url: Some("https://en.wikipedia.org/wiki/Cercospora"),
    },
    ClassEntry {
        name: "Bacterial Leaf Spot",
        description: "Small greasy dark spots on leaves that turn brown with yellow halos, caused by Xanthomonas bacteria spread by splashing water.",
        advice: "Use clean seed, remove infected plants, keep foliage dry, and apply copper-based bactericide early in the outbreak.",
        image: Some("catalog/bacterial_spot.jpg"),
        reference_url: None,
    },
    ClassEntry {
        name: "Chilli Leaf Curl Virus",
        description: "Leaves curl upward, thicken and shrink, and plants become stunted. The virus is spread by whiteflies.",
        advice: "Remove infected plants, control whiteflies with yellow sticky traps or insecticide, and grow resistant varieties next season.",
        image: Some("catalog/leaf_curl.jpg"),
        reference_url: Some("https://en.wikipedia.org/wiki/Chilli_leaf_curl_virus"),
    },
    ClassEntry {
        name: "Powdery Mildew",
        description: "White powdery patches on the underside of leaves with yellowing on the upper surface.",
        advice: "Remove badly affected leaves, avoid excess nitrogen, and spray sulfur or potassium bicarbonate.",
        image: Some("catalog/powdery_mildew.jpg"),
        reference_url: Some("https://en.wikipedia.org/wiki/Powdery_mildew"),
    },
    ClassEntry {
        name: "Fruit Rot",
        description: "Soft, wrinkled or discoloured fruit that is decaying on the plant.",
        advice: "Harvest promptly, discard rotten fruit away from the field, and avoid wounding fruit during handling.",
        image: None,
        reference_url: None,
    },
];

/// Read-only table from class index to [`ClassEntry`]
#[derive(Debug, Clone, Copy)]
pub struct ClassCatalog {
    entries: &'static [ClassEntry],
}

/// The 7-class chilli catalog the production model is trained against
pub static CHILLI_CATALOG: ClassCatalog = ClassCatalog::new(&CHILLI_CLASSES);

impl ClassCatalog {
    /// Build a catalog over a static table
    pub const fn new(entries: &'static [ClassEntry]) -> Self {
        Self { entries }
    }

    /// Number of known classes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a class index, falling back to [`UNKNOWN_CLASS`]
    pub fn lookup(&self, class_id: usize) -> &ClassEntry {
        self.entries.get(class_id).unwrap_or(&UNKNOWN_CLASS)
    }

    /// Resolve a class index without the fallback
    pub fn get(&self, class_id: usize) -> Option<&ClassEntry> {
        self.entries.get(class_id)
    }

    /// Iterate over all known entries in class order
    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.entries.iter()
    }
}

impl std::ops::Index<usize> for ClassCatalog {
    type Output = ClassEntry;

    fn index(&self, class_id: usize) -> &Self::Output {
        self.lookup(class_id)
    }
}
