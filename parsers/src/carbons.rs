// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

generate_empty_element!(
    /// Enable carbons for this session.
    Enable,
    "enable",
    CARBONS
);

generate_empty_element!(
    /// Disable a previously-enabled carbons.
    Disable,
    "disable",
    CARBONS
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;
    use crate::Element;

    #[test]
    fn empty_elements() {
        let elem: Element = "<enable xmlns='urn:xmpp:carbons:2'/>".parse().unwrap();
        Enable::try_from(elem).unwrap();

        let elem: Element = "<disable xmlns='urn:xmpp:carbons:2'/>".parse().unwrap();
        Disable::try_from(elem).unwrap();
    }

    #[test]
    fn serialise() {
        let elem: Element = Enable.into();
        assert!(elem.is("enable", ns::CARBONS));
    }
}
