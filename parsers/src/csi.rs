// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

generate_empty_element!(
    /// Stream:feature sent by the server to advertise it supports CSI.
    Feature,
    "csi",
    CSI
);

generate_empty_element!(
    /// Client indicates it is inactive.
    Inactive,
    "inactive",
    CSI
);

generate_empty_element!(
    /// Client indicates it is active again.
    Active,
    "active",
    CSI
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;
    use crate::Element;

    #[test]
    fn test_inactive() {
        let elem: Element = "<inactive xmlns='urn:xmpp:csi:0'/>".parse().unwrap();
        Inactive::try_from(elem).unwrap();
    }

    #[test]
    fn test_invalid() {
        let elem: Element = "<inactive xmlns='urn:xmpp:csi:0' foo='bar'/>"
            .parse()
            .unwrap();
        let error = Active::try_from(elem.clone()).unwrap_err();
        assert_eq!(error.to_string(), "parse error: This is not a active element.");
        let error = Inactive::try_from(elem).unwrap_err();
        assert_eq!(
            error.to_string(),
            "parse error: Unknown attribute in inactive element."
        );
    }

    #[test]
    fn test_serialise() {
        let elem: Element = Active.into();
        assert!(elem.is("active", ns::CSI));
        let elem: Element = Inactive.into();
        assert!(elem.is("inactive", ns::CSI));
    }
}
