// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use proptest::prelude::*;
use runlens_core::{ComparisonSet, TriState, MAX_COMPARISON_RUNS};

fn tristate() -> impl Strategy<Value = TriState> {
    prop_oneof![
        Just(TriState::Unset),
        Just(TriState::Positive),
        Just(TriState::Negative),
    ]
}

proptest! {
    #[test]
    fn three_toggles_return_to_start(start in tristate()) {
        prop_assert_eq!(start.cycle().cycle().cycle(), start);
    }

    #[test]
    fn three_toggles_from_unset_end_unset(_seed in 0u8..4) {
        let state = TriState::default().cycle().cycle().cycle();
        prop_assert!(state.is_unset());
    }

    #[test]
    fn comparison_set_never_exceeds_limit(ids in proptest::collection::vec("[a-f]{1,2}", 0..12)) {
        let mut set = ComparisonSet::new();
        for id in &ids {
            set.add(id.clone());
        }
        prop_assert!(set.len() <= MAX_COMPARISON_RUNS);
        let mut unique = set.run_ids().to_vec();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), set.len());
    }
}
