//! FEAT negotiation into a capability bitset.

use bitflags::bitflags;

bitflags! {
    /// Optional server features the fetch worker cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FeatureSet: u16 {
        /// MLST/MLSD with the `modify` fact.
        const MLST_MODIFY = 1 << 0;
        /// MLST/MLSD with the `size` fact.
        const MLST_SIZE = 1 << 1;
        /// MLST/MLSD with the `type` fact.
        const MLST_TYPE = 1 << 2;
        /// MDTM is available.
        const MDTM = 1 << 3;
        /// SIZE is available.
        const SIZE = 1 << 4;
        /// REST STREAM is available, so downloads may resume at an offset.
        const REST_STREAM = 1 << 5;
        /// UTF-8 path names.
        const UTF8 = 1 << 6;
    }
}

impl FeatureSet {
    /// Whether machine listings carry everything a scan needs.
    #[must_use]
    pub fn machine_listing_usable(self) -> bool {
        self.contains(Self::MLST_MODIFY | Self::MLST_SIZE | Self::MLST_TYPE)
    }

    /// Parses a raw FEAT response body.
    ///
    /// Feature lines arrive indented; the `MLST` line carries its fact list
    /// as `name*;` entries, the `*` marking facts enabled by default.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut set = Self::empty();
        for line in body.lines() {
            let line = line.trim();
            if let Some(facts) = line
                .strip_prefix("MLST ")
                .or_else(|| line.strip_prefix("MLST\t"))
            {
                for fact in facts.split(';').filter(|f| !f.is_empty()) {
                    let fact = fact.trim_end_matches('*');
                    if fact.eq_ignore_ascii_case("modify") {
                        set |= Self::MLST_MODIFY;
                    } else if fact.eq_ignore_ascii_case("size") {
                        set |= Self::MLST_SIZE;
                    } else if fact.eq_ignore_ascii_case("type") {
                        set |= Self::MLST_TYPE;
                    }
                }
            } else if line.eq_ignore_ascii_case("MDTM") {
                set |= Self::MDTM;
            } else if line.eq_ignore_ascii_case("SIZE") {
                set |= Self::SIZE;
            } else if line.eq_ignore_ascii_case("REST STREAM") {
                set |= Self::REST_STREAM;
            } else if line.eq_ignore_ascii_case("UTF8") {
                set |= Self::UTF8;
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEAT_BODY: &str = "211-Features:\r\n MDTM\r\n MLST modify*;perm*;size*;type*;unique*;\r\n REST STREAM\r\n SIZE\r\n UTF8\r\n211 End\r\n";

    #[test]
    fn parses_common_feature_block() {
        let set = FeatureSet::parse(FEAT_BODY);
        assert!(set.contains(FeatureSet::MLST_MODIFY));
        assert!(set.contains(FeatureSet::MLST_SIZE));
        assert!(set.contains(FeatureSet::MLST_TYPE));
        assert!(set.contains(FeatureSet::MDTM));
        assert!(set.contains(FeatureSet::SIZE));
        assert!(set.contains(FeatureSet::REST_STREAM));
        assert!(set.contains(FeatureSet::UTF8));
        assert!(set.machine_listing_usable());
    }

    #[test]
    fn partial_mlst_facts_disable_machine_listing() {
        let set = FeatureSet::parse("211-Features:\r\n MLST size*;type*;\r\n211 End\r\n");
        assert!(!set.contains(FeatureSet::MLST_MODIFY));
        assert!(!set.machine_listing_usable());
    }

    #[test]
    fn empty_feat_means_no_features() {
        let set = FeatureSet::parse("211 End\r\n");
        assert!(set.is_empty());
    }
}
