//! Fixed parts every written package carries: theme, master and layouts.

use std::fmt::Write as _;

use anyhow::Result;

use crate::xml::{escape, XML_DECLARATION};

pub const THEME: &str = include_str!("../resources/theme1.xml");

pub const NAMESPACES: &str = concat!(
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#
);

pub const EMPTY_SHAPE_TREE: &str = concat!(
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/>"#,
    r#"<a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#
);

const FIRST_LAYOUT_ID: u64 = 2_147_483_649;

const TEXT_STYLES: &str = concat!(
    "<p:txStyles>",
    r#"<p:titleStyle><a:lvl1pPr algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1">"#,
    r#"<a:lnSpc><a:spcPct val="90000"/></a:lnSpc><a:spcBef><a:spcPct val="0"/></a:spcBef><a:buNone/>"#,
    r#"<a:defRPr sz="4400" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill>"#,
    r#"<a:latin typeface="+mj-lt"/><a:ea typeface="+mj-ea"/><a:cs typeface="+mj-cs"/></a:defRPr>"#,
    "</a:lvl1pPr></p:titleStyle>",
    r#"<p:bodyStyle><a:lvl1pPr marL="228600" indent="-228600" algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1">"#,
    r#"<a:lnSpc><a:spcPct val="90000"/></a:lnSpc><a:spcBef><a:spcPts val="1000"/></a:spcBef>"#,
    r#"<a:buFont typeface="Arial"/><a:buChar char="&#8226;"/>"#,
    r#"<a:defRPr sz="2800" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill>"#,
    r#"<a:latin typeface="+mn-lt"/><a:ea typeface="+mn-ea"/><a:cs typeface="+mn-cs"/></a:defRPr>"#,
    "</a:lvl1pPr></p:bodyStyle>",
    r#"<p:otherStyle><a:defPPr><a:defRPr lang="en-US"/></a:defPPr>"#,
    r#"<a:lvl1pPr marL="0" algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1">"#,
    r#"<a:defRPr sz="1800" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill>"#,
    r#"<a:latin typeface="+mn-lt"/><a:ea typeface="+mn-ea"/><a:cs typeface="+mn-cs"/></a:defRPr>"#,
    "</a:lvl1pPr></p:otherStyle>",
    "</p:txStyles>"
);

/// The master lists one layout per name; `rIdN` for layout `N` and the theme
/// right after them.
pub fn slide_master(layout_count: usize) -> Result<String> {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECLARATION);
    write!(xml, "<p:sldMaster {NAMESPACES}>")?;
    xml.push_str(r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>"#);
    write!(xml, "<p:spTree>{EMPTY_SHAPE_TREE}</p:spTree></p:cSld>")?;
    xml.push_str(concat!(
        r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" "#,
        r#"accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#
    ));
    xml.push_str("<p:sldLayoutIdLst>");
    for idx in 0..layout_count {
        write!(
            xml,
            r#"<p:sldLayoutId id="{}" r:id="rId{}"/>"#,
            FIRST_LAYOUT_ID + idx as u64,
            idx + 1
        )?;
    }
    xml.push_str("</p:sldLayoutIdLst>");
    xml.push_str(TEXT_STYLES);
    xml.push_str("</p:sldMaster>");
    Ok(xml)
}

pub fn slide_layout(name: &str) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECLARATION);
    write!(xml, r#"<p:sldLayout {NAMESPACES} preserve="1">"#)?;
    write!(
        xml,
        r#"<p:cSld name="{}"><p:spTree>{EMPTY_SHAPE_TREE}</p:spTree></p:cSld>"#,
        escape(name)
    )?;
    xml.push_str("<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn fixed_parts_are_well_formed() {
        let theme = parse(THEME.as_bytes()).unwrap();
        assert_eq!(theme.name, "theme");

        let master = parse(slide_master(2).unwrap().as_bytes()).unwrap();
        let ids: Vec<_> = master
            .child("sldLayoutIdLst")
            .unwrap()
            .children("sldLayoutId")
            .map(|id| id.attr("r:id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["rId1", "rId2"]);

        let layout = parse(slide_layout("Title & Body").unwrap().as_bytes()).unwrap();
        assert_eq!(layout.child("cSld").unwrap().attr("name"), Some("Title & Body"));
    }
}
