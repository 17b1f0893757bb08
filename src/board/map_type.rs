use crate::{
    backend::Document,
    db::{Drawing, TextNote, Token},
};

/// The map an untagged object belongs to.
pub const GLOBAL_MAP: &str = "global";

/// The map a stored tag stands for: untagged means [`GLOBAL_MAP`].
pub fn effective(tag: Option<&str>) -> &str {
    match tag {
        Some(tag) if !tag.is_empty() => tag,
        _ => GLOBAL_MAP,
    }
}

pub trait MapTagged {
    fn map_tag(&self) -> Option<&str>;

    fn on_map(&self, map_type: &str) -> bool {
        effective(self.map_tag()) == map_type
    }
}

impl MapTagged for Document {
    fn map_tag(&self) -> Option<&str> {
        self.get_str("mapType")
    }
}

macro_rules! map_tagged {
    ($($T:ty),*) => {
        $(
            impl MapTagged for $T {
                fn map_tag(&self) -> Option<&str> {
                    self.map_type.as_deref()
                }
            }
        )*
    };
}

map_tagged!(Drawing, TextNote, Token);
