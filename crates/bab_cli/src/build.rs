//! `bab build`: compiles the stream generated by one input document.
//!
//! Settings come from `--config`, or from the nearest `bab.toml` above the input,
//! with command-line overrides applied on top. Every asset type of the schema is
//! compiled by the passthrough plugin.

use std::path::Path;
use std::sync::Arc;

use bab_common::TargetPlatform;
use bab_config::Settings;
use bab_diagnostics::{DiagnosticRenderer, DiagnosticSink, TerminalRenderer};
use bab_engine::{BuildSession, BuildSummary, PassthroughPlugin, PluginRegistry};
use bab_schema::SchemaSet;

use crate::{BuildArgs, GlobalArgs};

/// Exit code for a successful build.
pub const EXIT_OK: i32 = 0;
/// Exit code for a failed build.
pub const EXIT_BUILD_ERROR: i32 = 1;
/// Exit code for unusable settings or schema.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Runs the `bab build` command.
///
/// Returns exit code 0 on success, 1 when the build fails or a plugin reports an
/// error, and 2 when settings or the schema cannot be loaded.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let settings = match resolve_settings(args, global.config.as_deref()) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("error: {message}");
            return Ok(EXIT_CONFIG_ERROR);
        }
    };
    let schema = match load_schema(args, &settings) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("error: {message}");
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    if !global.quiet {
        eprintln!(
            "   Building {} ({}, configuration '{}')",
            args.input.display(),
            settings.build.target_platform,
            settings.build.configuration
        );
    }

    let plugins = passthrough_registry(&schema);
    let mut session = BuildSession::new(settings, schema, plugins);
    let result = session.build(&args.input);
    let errors = render_diagnostics(session.diagnostics(), global);

    match result {
        Ok(summary) => {
            report_summary(&summary, args, global)?;
            Ok(if errors > 0 { EXIT_BUILD_ERROR } else { EXIT_OK })
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(EXIT_BUILD_ERROR)
        }
    }
}

/// Loads settings and applies the configuration overlay and command-line overrides.
pub fn resolve_settings(args: &BuildArgs, config: Option<&Path>) -> Result<Settings, String> {
    let file = match config {
        Some(path) => Some(path.to_path_buf()),
        None => bab_config::find_settings_file(&args.input),
    };
    let mut settings = match &file {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading settings");
            bab_config::load_settings(path).map_err(|e| format!("{}: {e}", path.display()))?
        }
        None => Settings::default(),
    };

    if let Some(name) = &args.configuration {
        settings = bab_config::resolve_configuration(&settings, name).map_err(|e| e.to_string())?;
    }
    if let Some(output) = &args.output {
        settings.paths.output_directory = output.clone();
    }
    if let Some(platform) = &args.platform {
        settings.build.target_platform = platform
            .parse::<TargetPlatform>()
            .map_err(|e| e.to_string())?;
    }
    if let Some(level) = args.error_level {
        settings.build.error_level = level;
    }
    if args.linked {
        settings.build.linked_streams = true;
    }
    if args.stable_sort {
        settings.build.stable_sort = true;
    }
    Ok(settings)
}

fn load_schema(args: &BuildArgs, settings: &Settings) -> Result<SchemaSet, String> {
    let path = args
        .schema
        .as_ref()
        .or(settings.paths.schema_path.as_ref())
        .ok_or_else(|| "no asset schema given (set paths.schema_path or pass --schema)".to_string())?;
    SchemaSet::load(path).map_err(|e| format!("{}: {e}", path.display()))
}

/// A registry that compiles every asset type of `schema` with [`PassthroughPlugin`].
pub fn passthrough_registry(schema: &SchemaSet) -> PluginRegistry {
    let plugin = Arc::new(PassthroughPlugin::new(schema));
    let mut plugins = PluginRegistry::new(Arc::new(DiagnosticSink::new()));
    for type_name in schema.asset_types() {
        plugins.register(type_name, plugin.clone());
    }
    plugins
}

/// Prints collected diagnostics to stderr and returns how many were errors.
fn render_diagnostics(sink: &DiagnosticSink, global: &GlobalArgs) -> usize {
    let renderer = TerminalRenderer::new(global.color);
    let diagnostics = sink.take_all();
    let mut errors = 0;
    for diag in &diagnostics {
        if diag.severity.is_error() {
            errors += 1;
        } else if global.quiet {
            continue;
        }
        eprint!("{}", renderer.render(diag));
    }
    errors
}

fn report_summary(
    summary: &BuildSummary,
    args: &BuildArgs,
    global: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    if global.quiet {
        return Ok(());
    }
    eprintln!(
        "   Documents {} opened, {} parsed, {} reused",
        summary.documents, summary.files_parsed, summary.documents_reused
    );
    eprintln!(
        "   Instances {} processed, {} compiled, {} copied, {} reused",
        summary.instances_processed,
        summary.instances_compiled,
        summary.assets_copied,
        summary.assets_reused
    );
    if summary.missing_references > 0 {
        eprintln!("   Missing references: {}", summary.missing_references);
    }
    eprintln!(
        "    Stream {} ({:08x})",
        summary.manifest.display(),
        summary.stream_checksum
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="BaseAssetType">
    <xs:attribute name="id" type="xs:string" use="required"/>
  </xs:complexType>
  <xs:complexType name="Thing">
    <xs:complexContent>
      <xs:extension base="BaseAssetType">
        <xs:attribute name="speed" type="xs:int"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="Thing" type="Thing"/>
</xs:schema>"#;

    const ROOT: &str = r#"<AssetDeclaration>
  <Thing id="foo" speed="3"/>
</AssetDeclaration>"#;

    fn build_args(argv: &[&str]) -> BuildArgs {
        let mut full = vec!["bab", "build"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Build(args) => args,
            _ => panic!("expected Build command"),
        }
    }

    fn quiet() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            color: false,
            config: None,
        }
    }

    fn project() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("assets.xsd"), XSD).unwrap();
        std::fs::write(
            dir.path().join("bab.toml"),
            "[paths]\nschema_path = \"assets.xsd\"\noutput_directory = \"out\"\n",
        )
        .unwrap();
        let root = dir.path().join("root.xml");
        std::fs::write(&root, ROOT).unwrap();
        (dir, root)
    }

    #[test]
    fn settings_file_is_found_next_to_input() {
        let (dir, root) = project();
        let args = build_args(&[root.to_str().unwrap()]);
        let settings = resolve_settings(&args, None).unwrap();
        assert_eq!(settings.paths.output_directory, dir.path().join("out"));
        assert_eq!(settings.paths.schema_path, Some(dir.path().join("assets.xsd")));
    }

    #[test]
    fn overrides_apply_on_top_of_settings() {
        let (_dir, root) = project();
        let args = build_args(&[
            root.to_str().unwrap(),
            "--platform",
            "ps3",
            "--error-level",
            "2",
            "--stable-sort",
            "--output",
            "/tmp/elsewhere",
        ]);
        let settings = resolve_settings(&args, None).unwrap();
        assert_eq!(settings.build.target_platform, TargetPlatform::Ps3);
        assert!(settings.build.is_big_endian());
        assert_eq!(settings.build.error_level, 2);
        assert!(settings.build.stable_sort);
        assert_eq!(settings.paths.output_directory, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn unknown_platform_is_a_config_error() {
        let (_dir, root) = project();
        let args = build_args(&[root.to_str().unwrap(), "--platform", "amiga"]);
        assert!(resolve_settings(&args, None).is_err());
        assert_eq!(run(&args, &quiet()).unwrap(), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn unknown_configuration_is_a_config_error() {
        let (_dir, root) = project();
        let args = build_args(&[root.to_str().unwrap(), "--configuration", "Release"]);
        assert_eq!(run(&args, &quiet()).unwrap(), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn missing_schema_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root.xml");
        std::fs::write(&root, ROOT).unwrap();
        let config = dir.path().join("empty.toml");
        std::fs::write(&config, "").unwrap();
        let args = build_args(&[root.to_str().unwrap()]);
        let global = GlobalArgs {
            config: Some(config),
            ..quiet()
        };
        assert_eq!(run(&args, &global).unwrap(), EXIT_CONFIG_ERROR);
    }

    #[test]
    fn build_writes_manifest() {
        let (dir, root) = project();
        let args = build_args(&[root.to_str().unwrap()]);
        assert_eq!(run(&args, &quiet()).unwrap(), EXIT_OK);
        assert!(dir.path().join("out").join("root.manifest").is_file());
    }

    #[test]
    fn missing_input_fails_the_build() {
        let (dir, _root) = project();
        let missing = dir.path().join("nope.xml");
        let args = build_args(&[missing.to_str().unwrap()]);
        assert_eq!(run(&args, &quiet()).unwrap(), EXIT_BUILD_ERROR);
    }

    #[test]
    fn registry_covers_schema_types() {
        let schema = SchemaSet::parse(XSD).unwrap();
        let plugins = passthrough_registry(&schema);
        assert_eq!(plugins.len(), schema.asset_types().count());
        assert!(schema.asset_types().any(|t| t == "Thing"));
    }
}
