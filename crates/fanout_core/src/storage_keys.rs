pub const DEFAULT_CONTACT_LIST_PREFIX: &str = "contact-lists";
pub const DEFAULT_BATCH_PREFIX: &str = "contact-list-batches";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobArea {
    ContactLists,
    Batches,
}

impl BlobArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContactLists => "contact_lists",
            Self::Batches => "batches",
        }
    }
}

pub fn batch_blob_name(epoch_millis: i64, index: usize) -> String {
    format!("{epoch_millis}-batch-{index}")
}

pub fn area_prefix(base_prefix: &str) -> String {
    let trimmed = base_prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

pub fn object_key(base_prefix: &str, blob_name: &str) -> String {
    format!("{}{}", area_prefix(base_prefix), blob_name.trim_start_matches('/'))
}

pub fn blob_name_from_key<'a>(base_prefix: &str, key: &'a str) -> Option<&'a str> {
    let name = key.strip_prefix(area_prefix(base_prefix).as_str())?;
    if name.is_empty() || name.ends_with('/') {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_batch_key_under_trimmed_prefix() {
        let key = object_key("/contact-list-batches/", &batch_blob_name(1_580_644_770_456, 3));
        assert_eq!(key, "contact-list-batches/1580644770456-batch-3");
    }

    #[test]
    fn empty_prefix_keeps_bare_names() {
        assert_eq!(object_key("", "list.json"), "list.json");
        assert_eq!(blob_name_from_key("", "list.json"), Some("list.json"));
    }

    #[test]
    fn strips_prefix_back_to_blob_name() {
        assert_eq!(
            blob_name_from_key("contact-lists", "contact-lists/march/list.json"),
            Some("march/list.json")
        );
        assert_eq!(blob_name_from_key("contact-lists", "other/list.json"), None);
        assert_eq!(blob_name_from_key("contact-lists", "contact-lists/"), None);
    }
}
