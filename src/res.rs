//! Static data shipped inside the binary, read from `res/` at build time.

#[macro_export]
macro_rules! include_res {
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (json, $p:expr) => {
        serde_json::from_str($crate::include_res!(str, $p))
    };
}
