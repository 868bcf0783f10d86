//! Chart parts. Data is stored as literals (`c:strLit`/`c:numLit`), so the
//! package carries no embedded workbook.

use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use deckpad_core::model::{Chart, ChartKind, ChartSeries};

use crate::xml::{escape, Element, XML_DECLARATION};

const CATEGORY_AXIS: u32 = 500_000_001;
const VALUE_AXIS: u32 = 500_000_002;

fn plot_element(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar | ChartKind::Column => "c:barChart",
        ChartKind::Line => "c:lineChart",
        ChartKind::Pie => "c:pieChart",
        ChartKind::Area => "c:areaChart",
    }
}

fn write_series(xml: &mut String, chart: &Chart) -> Result<()> {
    for (idx, series) in chart.series.iter().enumerate() {
        write!(
            xml,
            r#"<c:ser><c:idx val="{idx}"/><c:order val="{idx}"/><c:tx><c:v>{}</c:v></c:tx>"#,
            escape(&series.name)
        )?;
        if chart.kind == ChartKind::Line {
            xml.push_str(r#"<c:marker><c:symbol val="none"/></c:marker>"#);
        }
        write!(
            xml,
            r#"<c:cat><c:strLit><c:ptCount val="{}"/>"#,
            chart.categories.len()
        )?;
        for (point, category) in chart.categories.iter().enumerate() {
            write!(xml, r#"<c:pt idx="{point}"><c:v>{}</c:v></c:pt>"#, escape(category))?;
        }
        xml.push_str("</c:strLit></c:cat>");
        write!(
            xml,
            r#"<c:val><c:numLit><c:formatCode>General</c:formatCode><c:ptCount val="{}"/>"#,
            series.values.len()
        )?;
        for (point, value) in series.values.iter().enumerate() {
            write!(xml, r#"<c:pt idx="{point}"><c:v>{value}</c:v></c:pt>"#)?;
        }
        xml.push_str("</c:numLit></c:val>");
        if chart.kind == ChartKind::Line {
            xml.push_str(r#"<c:smooth val="0"/>"#);
        }
        xml.push_str("</c:ser>");
    }
    Ok(())
}

fn write_axes(xml: &mut String, kind: ChartKind) -> Result<()> {
    let (category_position, value_position) = match kind {
        ChartKind::Bar => ("l", "b"),
        _ => ("b", "l"),
    };
    write!(
        xml,
        concat!(
            r#"<c:catAx><c:axId val="{cat}"/><c:scaling><c:orientation val="minMax"/></c:scaling>"#,
            r#"<c:delete val="0"/><c:axPos val="{cat_pos}"/><c:numFmt formatCode="General" sourceLinked="0"/>"#,
            r#"<c:tickLblPos val="nextTo"/><c:crossAx val="{val}"/><c:crosses val="autoZero"/>"#,
            r#"<c:auto val="1"/><c:lblAlgn val="ctr"/><c:lblOffset val="100"/></c:catAx>"#,
            r#"<c:valAx><c:axId val="{val}"/><c:scaling><c:orientation val="minMax"/></c:scaling>"#,
            r#"<c:delete val="0"/><c:axPos val="{val_pos}"/><c:majorGridlines/>"#,
            r#"<c:numFmt formatCode="General" sourceLinked="1"/><c:tickLblPos val="nextTo"/>"#,
            r#"<c:crossAx val="{cat}"/><c:crosses val="autoZero"/><c:crossBetween val="between"/></c:valAx>"#
        ),
        cat = CATEGORY_AXIS,
        val = VALUE_AXIS,
        cat_pos = category_position,
        val_pos = value_position,
    )?;
    Ok(())
}

pub fn chart_xml(chart: &Chart) -> Result<String> {
    let mut xml = String::with_capacity(2048);
    xml.push_str(XML_DECLARATION);
    xml.push_str(concat!(
        r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" "#,
        r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
        r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        r#"<c:roundedCorners val="0"/><c:chart><c:autoTitleDeleted val="1"/><c:plotArea><c:layout/>"#
    ));

    let element = plot_element(chart.kind);
    write!(xml, "<{element}>")?;
    match chart.kind {
        ChartKind::Bar | ChartKind::Column => {
            let direction = if chart.kind == ChartKind::Bar { "bar" } else { "col" };
            write!(
                xml,
                r#"<c:barDir val="{direction}"/><c:grouping val="clustered"/><c:varyColors val="0"/>"#
            )?;
        }
        ChartKind::Line | ChartKind::Area => {
            xml.push_str(r#"<c:grouping val="standard"/><c:varyColors val="0"/>"#);
        }
        ChartKind::Pie => xml.push_str(r#"<c:varyColors val="1"/>"#),
    }
    write_series(&mut xml, chart)?;
    match chart.kind {
        ChartKind::Pie => xml.push_str(r#"<c:firstSliceAng val="0"/>"#),
        kind => {
            match kind {
                ChartKind::Bar | ChartKind::Column => {
                    xml.push_str(r#"<c:gapWidth val="150"/>"#)
                }
                ChartKind::Line => xml.push_str(r#"<c:marker val="1"/>"#),
                _ => {}
            }
            write!(
                xml,
                r#"<c:axId val="{CATEGORY_AXIS}"/><c:axId val="{VALUE_AXIS}"/>"#
            )?;
        }
    }
    write!(xml, "</{element}>")?;
    if chart.kind != ChartKind::Pie {
        write_axes(&mut xml, chart.kind)?;
    }

    xml.push_str(concat!(
        r#"</c:plotArea><c:legend><c:legendPos val="r"/><c:overlay val="0"/></c:legend>"#,
        r#"<c:plotVisOnly val="1"/><c:dispBlanksAs val="gap"/></c:chart></c:chartSpace>"#
    ));
    Ok(xml)
}

/// Point values from a literal or a cached reference, indexed by `c:pt@idx`.
fn points(data: &Element) -> Vec<String> {
    let Some(container) = ["strLit", "numLit"]
        .iter()
        .find_map(|name| data.child(name))
        .or_else(|| {
            ["strRef", "numRef", "multiLvlStrRef"].iter().find_map(|name| {
                let reference = data.child(name)?;
                ["strCache", "numCache", "multiLvlStrCache"]
                    .iter()
                    .find_map(|cache| reference.child(cache))
            })
        })
    else {
        return Vec::new();
    };
    let count = container
        .child("ptCount")
        .and_then(|count| count.parse_attr::<usize>("val"))
        .unwrap_or(0);
    let mut values = vec![String::new(); count];
    for point in container.children("pt") {
        let Some(idx) = point.parse_attr::<usize>("idx") else {
            continue;
        };
        if idx >= values.len() {
            values.resize(idx + 1, String::new());
        }
        values[idx] = point.child("v").map(Element::text).unwrap_or_default();
    }
    values
}

fn series_name(series: &Element, position: usize) -> String {
    series
        .child("tx")
        .and_then(|tx| {
            tx.child("v")
                .map(Element::text)
                .or_else(|| points(tx).into_iter().next())
        })
        .unwrap_or_else(|| format!("Series {}", position + 1))
}

pub fn parse_chart(root: &Element) -> Result<Chart> {
    let plot = root
        .path(&["chart", "plotArea"])
        .ok_or_else(|| anyhow!("chart part has no plot area"))?;
    let (kind, group) = plot
        .elements()
        .find_map(|element| {
            let kind = match element.name.as_str() {
                "barChart" | "bar3DChart" => {
                    match element.child("barDir").and_then(|dir| dir.attr("val")) {
                        Some("bar") => ChartKind::Bar,
                        _ => ChartKind::Column,
                    }
                }
                "lineChart" | "line3DChart" => ChartKind::Line,
                "pieChart" | "pie3DChart" | "doughnutChart" => ChartKind::Pie,
                "areaChart" | "area3DChart" => ChartKind::Area,
                _ => return None,
            };
            Some((kind, element))
        })
        .ok_or_else(|| anyhow!("unsupported chart type"))?;

    let mut categories = Vec::new();
    let mut series = Vec::new();
    for (position, entry) in group.children("ser").enumerate() {
        if categories.is_empty() {
            categories = entry.child("cat").map(points).unwrap_or_default();
        }
        let values = entry
            .child("val")
            .map(points)
            .unwrap_or_default()
            .iter()
            .map(|value| value.trim().parse().unwrap_or(0.0))
            .collect();
        series.push(ChartSeries {
            name: series_name(entry, position),
            values,
        });
    }
    Ok(Chart {
        kind,
        categories,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn sample(kind: ChartKind) -> Chart {
        Chart {
            kind,
            categories: vec!["Q1".to_string(), "Q2 & Q3".to_string()],
            series: vec![
                ChartSeries {
                    name: "Revenue".to_string(),
                    values: vec![1.5, 2.0],
                },
                ChartSeries {
                    name: "Cost".to_string(),
                    values: vec![-0.25, 3.0],
                },
            ],
        }
    }

    #[test]
    fn every_kind_reads_back() {
        for kind in [
            ChartKind::Bar,
            ChartKind::Column,
            ChartKind::Line,
            ChartKind::Pie,
            ChartKind::Area,
        ] {
            let chart = sample(kind);
            let root = parse(chart_xml(&chart).unwrap().as_bytes()).unwrap();
            assert_eq!(parse_chart(&root).unwrap(), chart, "{kind:?}");
        }
    }

    #[test]
    fn cached_references_are_read() {
        let root = parse(
            br#"<c:chartSpace xmlns:c="urn:c"><c:chart><c:plotArea><c:lineChart>
            <c:ser><c:tx><c:strRef><c:f>Sheet1!$B$1</c:f><c:strCache><c:ptCount val="1"/>
            <c:pt idx="0"><c:v>Visitors</c:v></c:pt></c:strCache></c:strRef></c:tx>
            <c:cat><c:strRef><c:strCache><c:ptCount val="2"/><c:pt idx="1"><c:v>Feb</c:v></c:pt>
            <c:pt idx="0"><c:v>Jan</c:v></c:pt></c:strCache></c:strRef></c:cat>
            <c:val><c:numRef><c:numCache><c:ptCount val="2"/><c:pt idx="0"><c:v>10</c:v></c:pt>
            <c:pt idx="1"><c:v>12.5</c:v></c:pt></c:numCache></c:numRef></c:val></c:ser>
            </c:lineChart></c:plotArea></c:chart></c:chartSpace>"#,
        )
        .unwrap();
        let chart = parse_chart(&root).unwrap();
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.categories, vec!["Jan", "Feb"]);
        assert_eq!(chart.series[0].name, "Visitors");
        assert_eq!(chart.series[0].values, vec![10.0, 12.5]);
    }
}
