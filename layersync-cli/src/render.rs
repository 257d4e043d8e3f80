//! Plain-text rendering of pass reports.

use std::io::{self, Write};

use layersync_core::{
    ArtifactSummary, CoercionReport, Diagnostic, ExportReport, FieldDefn, ImportReport, Ineligible,
    InspectionReport, LayerSummary, SkipReason,
};

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Ineligible(Ineligible::Denied) => "excluded",
        SkipReason::Ineligible(Ineligible::NotSelected) => "not selected",
        SkipReason::Empty => "empty",
        SkipReason::MissingFromContainer => "not in the container",
    }
}

fn write_diagnostics(writer: &mut dyn Write, diagnostics: &[Diagnostic]) -> io::Result<()> {
    for diagnostic in diagnostics {
        writeln!(writer, "  {diagnostic}")?;
    }
    Ok(())
}

fn field_list(fields: &[FieldDefn]) -> String {
    fields
        .iter()
        .map(|field| format!("{} ({})", field.name, field.field_type))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn write_coercion(writer: &mut dyn Write, report: &CoercionReport) -> io::Result<()> {
    for field in &report.coerced {
        writeln!(
            writer,
            "coerced {}.{}: {} copied, {} dropped",
            field.layer, field.field, field.copied, field.dropped
        )?;
    }
    write_diagnostics(writer, &report.diagnostics)?;
    writeln!(
        writer,
        "coercion: {} fields narrowed, {} values dropped",
        report.coerced.len(),
        report.dropped_values()
    )
}

pub(crate) fn write_export(writer: &mut dyn Write, report: &ExportReport) -> io::Result<()> {
    for layer in &report.exported {
        writeln!(
            writer,
            "exported {} -> {} ({} features)",
            layer.layer, layer.path, layer.features
        )?;
    }
    for skipped in &report.skipped {
        writeln!(
            writer,
            "skipped {}: {}",
            skipped.layer,
            skip_reason(skipped.reason)
        )?;
    }
    write_diagnostics(writer, &report.failures)?;
    write_diagnostics(writer, &report.diagnostics)?;
    writeln!(
        writer,
        "export: {} exported, {} skipped, {} failed in {:.2?}",
        report.exported.len(),
        report.skipped.len(),
        report.failures.len(),
        report.elapsed
    )
}

pub(crate) fn write_import(writer: &mut dyn Write, report: &ImportReport) -> io::Result<()> {
    for path in &report.imported {
        writeln!(writer, "imported {path}")?;
    }
    write_diagnostics(writer, &report.failures)?;
    writeln!(
        writer,
        "import: {} imported, {} failed in {:.2?}",
        report.imported.len(),
        report.failures.len(),
        report.elapsed
    )
}

pub(crate) fn write_artifacts(
    writer: &mut dyn Write,
    report: &InspectionReport<ArtifactSummary>,
) -> io::Result<()> {
    for entry in &report.entries {
        writeln!(writer, "{}", entry.path)?;
        writeln!(writer, "  srs: {}", entry.srs_label())?;
        writeln!(writer, "  encoding: {}", entry.encoding_label())?;
        writeln!(writer, "  geometry: {}", entry.geometry_kind)?;
        writeln!(writer, "  features: {}", entry.feature_count)?;
        writeln!(writer, "  fields: {}", field_list(&entry.fields))?;
    }
    write_diagnostics(writer, &report.failures)
}

pub(crate) fn write_layers(
    writer: &mut dyn Write,
    report: &InspectionReport<LayerSummary>,
) -> io::Result<()> {
    for entry in &report.entries {
        writeln!(writer, "{}", entry.name)?;
        writeln!(writer, "  srs: {}", entry.srs_label())?;
        writeln!(writer, "  geometry: {}", entry.geometry_kind)?;
        writeln!(writer, "  features: {}", entry.feature_count)?;
        writeln!(writer, "  fields: {}", field_list(&entry.fields))?;
    }
    write_diagnostics(writer, &report.failures)
}

pub(crate) fn write_names(writer: &mut dyn Write, names: &[String]) -> io::Result<()> {
    for name in names {
        writeln!(writer, "{name}")?;
    }
    Ok(())
}
