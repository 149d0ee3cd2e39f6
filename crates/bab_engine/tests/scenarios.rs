//! End-to-end builds over small document trees.

use bab_common::{ErrorCode, InstanceHandle};
use bab_config::Settings;
use bab_diagnostics::{DiagnosticCode, DiagnosticSink};
use bab_engine::{
    AssetHeader, BuildSession, CacheAccess, DocumentState, LoadMode, Manifest, PassthroughPlugin,
    PluginRegistry, RetryPolicy,
};
use bab_schema::SchemaSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const XSD: &str = r#"
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:xas="uri:ea.com:eala:asset:schema">
  <xs:simpleType name="AssetReference"><xs:restriction base="xs:string"/></xs:simpleType>
  <xs:simpleType name="WeakReference"><xs:restriction base="AssetReference"/></xs:simpleType>
  <xs:simpleType name="FileReference"><xs:restriction base="xs:string"/></xs:simpleType>
  <xs:simpleType name="NodeRef" xas:refType="Node"><xs:restriction base="AssetReference"/></xs:simpleType>
  <xs:complexType name="BaseAssetType">
    <xs:attribute name="id" type="xs:string" use="required"/>
  </xs:complexType>
  <xs:complexType name="BaseInheritableAsset">
    <xs:complexContent><xs:extension base="BaseAssetType"/></xs:complexContent>
  </xs:complexType>
  <xs:complexType name="Part">
    <xs:attribute name="id" type="xs:string"/>
    <xs:attribute name="size" type="xs:int"/>
  </xs:complexType>
  <xs:complexType name="Thing">
    <xs:complexContent>
      <xs:extension base="BaseInheritableAsset">
        <xs:sequence>
          <xs:element name="Part" type="Part" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
        <xs:attribute name="speed" type="xs:int"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="Node">
    <xs:complexContent>
      <xs:extension base="BaseAssetType">
        <xs:attribute name="next" type="NodeRef"/>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="SubNode">
    <xs:complexContent><xs:extension base="Node"/></xs:complexContent>
  </xs:complexType>
  <xs:complexType name="OtherNode">
    <xs:complexContent><xs:extension base="Node"/></xs:complexContent>
  </xs:complexType>
  <xs:element name="Thing" type="Thing"/>
  <xs:element name="Node" type="Node"/>
  <xs:element name="SubNode" type="SubNode"/>
  <xs:element name="OtherNode" type="OtherNode"/>
</xs:schema>"#;

const BASE: &str = r#"<AssetDeclaration>
  <Thing id="foo" speed="1"><Part id="a" size="1"/><Part id="b" size="2"/></Thing>
</AssetDeclaration>"#;

const CHILD: &str = r#"<AssetDeclaration>
  <Includes><Include type="instance" source="base.xml"/></Includes>
  <Thing id="bar" inheritFrom="foo" speed="5"/>
</AssetDeclaration>"#;

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.paths.output_directory = self.out();
        settings
    }
}

fn session(settings: Settings) -> BuildSession {
    let schema = SchemaSet::parse(XSD).unwrap();
    let plugin = Arc::new(PassthroughPlugin::new(&schema));
    let mut plugins = PluginRegistry::new(Arc::new(DiagnosticSink::new()));
    for name in ["Thing", "Node", "SubNode", "OtherNode"] {
        plugins.register(name, plugin.clone());
    }
    BuildSession::new(settings, schema, plugins)
}

fn touch_later(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(5);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

fn load_manifest(session: &BuildSession, path: &Path) -> Manifest {
    Manifest::load(path, session.settings().build.is_big_endian()).unwrap()
}

fn entry_names(manifest: &Manifest) -> Vec<String> {
    (0..manifest.entries.len()).map(|i| manifest.entry_name(i)).collect()
}

fn resolved_references(s: &BuildSession, handle: &InstanceHandle) -> Vec<String> {
    s.find_instance(handle)
        .unwrap()
        .validated_referenced
        .as_ref()
        .unwrap()
        .iter()
        .map(InstanceHandle::name)
        .collect()
}

#[test]
fn inherited_instance_merges_source_subtree() {
    let fx = Fixture::new();
    fx.write("base.xml", BASE);
    let child = fx.write("child.xml", CHILD);

    let mut s = session(fx.settings());
    let summary = s.build(&child).unwrap();
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.instances_compiled, 2);

    let bar = s.find_instance(&InstanceHandle::new("Thing", "bar")).unwrap();
    let xml = bar.xml().unwrap();
    assert_eq!(xml.attr("id"), Some("bar"));
    assert_eq!(xml.attr("speed"), Some("5"));
    let parts: Vec<(&str, &str)> = xml
        .elements()
        .filter(|e| e.name == "Part")
        .map(|e| (e.attr("id").unwrap(), e.attr("size").unwrap()))
        .collect();
    assert_eq!(parts, [("a", "1"), ("b", "2")]);

    let foo = s.find_instance(&InstanceHandle::new("Thing", "foo")).unwrap();
    assert_ne!(foo.prevalidation_xml_hash, 0);
    assert_eq!(bar.inherit_from_xml_hash, foo.prevalidation_xml_hash);

    // Only what the root declares is output; the included source is not referenced.
    let manifest = load_manifest(&s, &summary.manifest);
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entry_name(0), "Thing:bar");
    assert_eq!(manifest.header.stream_checksum, summary.stream_checksum);
}

#[test]
fn inheriting_through_all_inclusion_is_rejected() {
    let fx = Fixture::new();
    fx.write("base.xml", BASE);
    let child = fx.write("child.xml", &CHILD.replace(r#"type="instance""#, r#"type="all""#));
    let err = session(fx.settings()).build(&child).unwrap_err();
    assert_eq!(err.code, ErrorCode::InheritFromError);
}

#[test]
fn mutual_strong_references_abort_the_build() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration><Node id="a" next="b"/><Node id="b" next="a"/></AssetDeclaration>"#,
    );
    let err = session(fx.settings()).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::CircularDependency);
    assert!(err.message.starts_with("Circular dependency detected between"));
    assert!(!fx.out().join("root.manifest").exists());
}

#[test]
fn dependents_are_transitive() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration><Node id="a" next="b"/><Node id="b" next="c"/><Node id="c"/></AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let summary = s.build(&root).unwrap();

    let a = s.find_instance(&InstanceHandle::new("Node", "a")).unwrap();
    let dependents: Vec<String> = a.all_dependents.iter().map(InstanceHandle::name).collect();
    assert_eq!(dependents.len(), 2);
    assert!(dependents.contains(&"Node:b".to_string()));
    assert!(dependents.contains(&"Node:c".to_string()));
    let c = s.find_instance(&InstanceHandle::new("Node", "c")).unwrap();
    assert!(c.all_dependents.is_empty());

    let manifest = load_manifest(&s, &summary.manifest);
    assert_eq!(manifest.entries.len(), 3);
    let position = |name: &str| (0..3).find(|i| manifest.entry_name(*i) == name).unwrap();
    assert!(position("Node:c") < position("Node:b"));
    assert!(position("Node:b") < position("Node:a"));
}

#[test]
fn unchanged_rerun_reuses_every_document() {
    let fx = Fixture::new();
    fx.write("base.xml", BASE);
    let child = fx.write("child.xml", CHILD);

    let first = session(fx.settings()).build(&child).unwrap();
    assert_eq!(first.files_parsed, 2);

    let mut s = session(fx.settings());
    let second = s.build(&child).unwrap();
    assert_eq!(second.files_parsed, 0);
    assert_eq!(second.documents_reused, 2);
    assert_eq!(second.instances_compiled, 0);
    assert_eq!(second.stream_checksum, first.stream_checksum);
    assert!(s.documents().all(|d| d.state == DocumentState::Complete));
}

#[test]
fn editing_an_inheritance_source_rebuilds_the_override() {
    let fx = Fixture::new();
    let base = fx.write("base.xml", BASE);
    let child = fx.write("child.xml", CHILD);
    let first = session(fx.settings()).build(&child).unwrap();

    std::fs::write(&base, BASE.replace(r#"size="2""#, r#"size="9""#)).unwrap();
    touch_later(&base);

    let mut s = session(fx.settings());
    let second = s.build(&child).unwrap();
    assert_eq!(second.files_parsed, 2);
    assert_ne!(second.stream_checksum, first.stream_checksum);
    let bar = s.find_instance(&InstanceHandle::new("Thing", "bar")).unwrap();
    let sizes: Vec<&str> = bar
        .xml()
        .unwrap()
        .elements()
        .filter_map(|e| e.attr("size"))
        .collect();
    assert_eq!(sizes, ["1", "9"]);
}

#[test]
fn referenced_stream_keeps_its_instances() {
    let fx = Fixture::new();
    fx.write("lib.xml", r#"<AssetDeclaration><Node id="shared"/></AssetDeclaration>"#);
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Includes><Include type="reference" source="lib.xml"/></Includes>
             <Node id="user" next="shared"/>
           </AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let summary = s.build(&root).unwrap();

    let lib = load_manifest(&s, &fx.out().join("lib.manifest"));
    assert_eq!(lib.entries.len(), 1);
    assert_eq!(lib.entry_name(0), "Node:shared");

    let manifest = load_manifest(&s, &summary.manifest);
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entry_name(0), "Node:user");
    assert_eq!(manifest.referenced_manifests, ["lib.manifest"]);
    let shared = InstanceHandle::new("Node", "shared");
    assert_eq!(
        manifest.entry_references(0),
        [(shared.type_id(), shared.instance_id())]
    );
}

#[test]
fn unknown_reference_is_a_warning_by_default() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration><Node id="a" next="ghost"/><Node id="b" next="ghost"/></AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let summary = s.build(&root).unwrap();
    assert_eq!(summary.missing_references, 1);
    let warnings: Vec<_> = s
        .diagnostics()
        .diagnostics()
        .into_iter()
        .filter(|d| d.code == DiagnosticCode::UNKNOWN_REFERENCE)
        .collect();
    assert_eq!(warnings.len(), 1);

    let mut strict = fx.settings();
    strict.build.error_level = 1;
    let err = session(strict).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownReference);
}

#[test]
fn same_instance_from_two_all_inclusions() {
    let fx = Fixture::new();
    fx.write("x.xml", r#"<AssetDeclaration><Node id="dup"/></AssetDeclaration>"#);
    fx.write("y.xml", r#"<AssetDeclaration><Node id="dup"/></AssetDeclaration>"#);
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration><Includes>
             <Include type="all" source="x.xml"/>
             <Include type="all" source="y.xml"/>
           </Includes></AssetDeclaration>"#,
    );
    let err = session(fx.settings()).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateInstance);
    assert!(err.message.starts_with("Duplicate Instance: Node:dup, in "));
}

#[test]
fn circular_inclusion_names_the_chain() {
    let fx = Fixture::new();
    let a = fx.write(
        "a.xml",
        r#"<AssetDeclaration><Includes><Include type="all" source="b.xml"/></Includes></AssetDeclaration>"#,
    );
    fx.write(
        "b.xml",
        r#"<AssetDeclaration><Includes><Include type="all" source="a.xml"/></Includes></AssetDeclaration>"#,
    );
    let err = session(fx.settings()).build(&a).unwrap_err();
    assert_eq!(err.code, ErrorCode::CircularDependency);
    assert!(err.message.starts_with("Circular inclusion: "));
    assert!(err.message.contains("b.xml"));
}

#[test]
fn missing_input_is_reported() {
    let fx = Fixture::new();
    let err = session(fx.settings())
        .build(&fx.dir.path().join("nope.xml"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InputXmlFileNotFound);
}

/// Refuses the first `failures` opens, as a cache share locked by another build would.
struct LockedShare {
    opens: AtomicU32,
    failures: u32,
}

impl CacheAccess for LockedShare {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        }
        Ok(Box::new(File::open(path)?))
    }
}

#[test]
fn locked_build_cache_is_retried() {
    let fx = Fixture::new();
    let root = fx.write("root.xml", r#"<AssetDeclaration><Node id="solo"/></AssetDeclaration>"#);
    let mut settings = fx.settings();
    settings.build.build_cache = true;
    settings.paths.build_cache_directory = Some(fx.dir.path().join("share"));

    let first = session(settings.clone()).build(&root).unwrap();
    assert_eq!(first.instances_compiled, 1);

    // A second machine: empty output, same shared cache.
    settings.paths.output_directory = fx.dir.path().join("out2");
    let share = Arc::new(LockedShare {
        opens: AtomicU32::new(0),
        failures: 3,
    });
    let retry = RetryPolicy {
        attempts: 20,
        delay: Duration::ZERO,
    };
    let mut s = session(settings).with_cache_access(share.clone(), retry);
    let second = s.build(&root).unwrap();
    assert_eq!(share.opens.load(Ordering::SeqCst), 4);
    assert_eq!(second.instances_compiled, 0);
    assert_eq!(second.assets_copied, 1);
    assert_eq!(second.stream_checksum, first.stream_checksum);

    let handle = &s
        .find_instance(&InstanceHandle::new("Node", "solo"))
        .unwrap()
        .handle;
    let path = fx
        .dir
        .path()
        .join("out2/assets")
        .join(format!("{}.asset", handle.file_base()));
    let header = AssetHeader::read_file(&path, s.settings().build.is_big_endian()).unwrap();
    assert!(header.matches(handle));
}


#[test]
fn any_type_inherits_within_its_own_document() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Node id="c"/>
             <Node id="a" next="c"/>
             <Node id="b" inheritFrom="a"/>
           </AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let summary = s.build(&root).unwrap();
    assert_eq!(summary.instances_compiled, 3);

    let a = s.find_instance(&InstanceHandle::new("Node", "a")).unwrap();
    let b = s.find_instance(&InstanceHandle::new("Node", "b")).unwrap();
    assert_eq!(b.xml().unwrap().attr("next"), Some("c"));
    assert_eq!(b.inherit_from_xml_hash, a.prevalidation_xml_hash);
    assert_eq!(resolved_references(&s, &InstanceHandle::new("Node", "b")), ["Node:c"]);
}

#[test]
fn non_inheritable_source_from_another_document_is_rejected() {
    let fx = Fixture::new();
    fx.write("lib.xml", r#"<AssetDeclaration><Node id="a"/></AssetDeclaration>"#);
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Includes><Include type="instance" source="lib.xml"/></Includes>
             <Node id="b" inheritFrom="a"/>
           </AssetDeclaration>"#,
    );
    let err = session(fx.settings()).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::InheritFromError);
    assert!(err.message.contains("is not an inheritable asset"));
}

#[test]
fn exact_reference_beats_derived_type_in_same_document() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <SubNode id="x"/>
             <Node id="x"/>
             <Node id="a" next="x"/>
           </AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    s.build(&root).unwrap();
    assert_eq!(resolved_references(&s, &InstanceHandle::new("Node", "a")), ["Node:x"]);
}

#[test]
fn exact_reference_in_inclusion_beats_derived_type_in_own_scope() {
    let fx = Fixture::new();
    fx.write("lib.xml", r#"<AssetDeclaration><Node id="x"/></AssetDeclaration>"#);
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Includes><Include type="instance" source="lib.xml"/></Includes>
             <SubNode id="x"/>
             <Node id="a" next="x"/>
           </AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let summary = s.build(&root).unwrap();
    assert_eq!(resolved_references(&s, &InstanceHandle::new("Node", "a")), ["Node:x"]);

    let names = entry_names(&load_manifest(&s, &summary.manifest));
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"Node:x".to_string()));
    assert!(names.contains(&"SubNode:x".to_string()));
}

#[test]
fn single_derived_type_match_resolves() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration><SubNode id="x"/><Node id="a" next="x"/></AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    s.build(&root).unwrap();
    assert_eq!(resolved_references(&s, &InstanceHandle::new("Node", "a")), ["SubNode:x"]);
}

#[test]
fn two_derived_type_matches_are_ambiguous() {
    let fx = Fixture::new();
    fx.write("lib.xml", r#"<AssetDeclaration><OtherNode id="x"/></AssetDeclaration>"#);
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Includes><Include type="instance" source="lib.xml"/></Includes>
             <SubNode id="x"/>
             <Node id="a" next="x"/>
           </AssetDeclaration>"#,
    );
    let err = session(fx.settings()).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::ReferencingError);
    assert!(err.message.starts_with("Reference Node:x is ambiguous."));
    assert!(err.message.contains("'SubNode:x'"));
    assert!(err.message.contains("'OtherNode:x'"));
}

const DEFINES: &str = r#"<AssetDeclaration>
  <Defines><Define name="Speed" value="3"/></Defines>
</AssetDeclaration>"#;

const USES_DEFINE: &str = r#"<AssetDeclaration>
  <Includes><Include type="all" source="defines.xml"/></Includes>
  <Thing id="t" speed="=$Speed"/>
</AssetDeclaration>"#;

#[test]
fn changed_definition_reloads_its_user_in_place() {
    let fx = Fixture::new();
    let defines = fx.write("defines.xml", DEFINES);
    let root = fx.write("root.xml", USES_DEFINE);
    let thing = InstanceHandle::new("Thing", "t");

    let mut s = session(fx.settings());
    let first = s.build(&root).unwrap();
    assert_eq!(s.find_instance(&thing).unwrap().handle.type_name(), "Thing");

    std::fs::write(&defines, DEFINES.replace(r#"value="3""#, r#"value="7""#)).unwrap();
    touch_later(&defines);

    let mut s = session(fx.settings());
    let second = s.build(&root).unwrap();
    let doc = s.documents().find(|d| d.source_path.ends_with("root.xml")).unwrap();
    assert_eq!(doc.last_load, Some(LoadMode::InPlace));
    assert_eq!(doc.used_defines.get("Speed").map(String::as_str), Some("7"));
    let lib = s.documents().find(|d| d.source_path.ends_with("defines.xml")).unwrap();
    assert_eq!(lib.last_load, Some(LoadMode::FromScratch));
    assert_eq!(second.instances_compiled, 1);
    assert_ne!(second.stream_checksum, first.stream_checksum);

    // The same sources built with nothing cached.
    let mut clean = fx.settings();
    clean.paths.output_directory = fx.dir.path().join("clean");
    let mut fresh = session(clean);
    let scratch = fresh.build(&root).unwrap();
    let doc = fresh.documents().find(|d| d.source_path.ends_with("root.xml")).unwrap();
    assert_eq!(doc.last_load, Some(LoadMode::FromScratch));
    assert_eq!(scratch.stream_checksum, second.stream_checksum);
    let incremental = load_manifest(&s, &second.manifest);
    let reference = load_manifest(&fresh, &scratch.manifest);
    assert_eq!(incremental.entries[0].header, reference.entries[0].header);
}

#[test]
fn patch_build_keeps_base_stream_layout() {
    let fx = Fixture::new();
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Node id="a" next="z"/>
             <Node id="m"/>
             <Node id="z"/>
           </AssetDeclaration>"#,
    );
    let mut release = fx.settings();
    release.build.stable_sort = true;
    release.paths.output_directory = fx.dir.path().join("release");
    let mut s = session(release);
    let shipped = s.build(&root).unwrap();
    let base_order = entry_names(&load_manifest(&s, &shipped.manifest));
    assert_eq!(base_order, ["Node:z", "Node:a", "Node:m"]);
    let base_dir = fx.dir.path().join("bases");
    std::fs::create_dir_all(&base_dir).unwrap();
    std::fs::copy(&shipped.manifest, base_dir.join("shipped.manifest")).unwrap();

    // The patch drops the dependency that put z first and adds an instance.
    fx.write("lib.xml", r#"<AssetDeclaration><Node id="shared"/></AssetDeclaration>"#);
    std::fs::write(
        &root,
        r#"<AssetDeclaration>
             <Includes><Include type="reference" source="lib.xml"/></Includes>
             <Node id="a"/>
             <Node id="m"/>
             <Node id="z"/>
             <Node id="zz"/>
           </AssetDeclaration>"#,
    )
    .unwrap();
    touch_later(&root);

    let mut patch = fx.settings();
    patch.build.stable_sort = true;
    patch.output.base_patch_stream = Some("shipped".to_string());
    patch.output.base_patch_search_paths = vec![base_dir];
    let mut s = session(patch);
    let summary = s.build(&root).unwrap();
    let manifest = load_manifest(&s, &summary.manifest);
    assert_eq!(entry_names(&manifest), ["Node:z", "Node:a", "Node:m", "Node:zz"]);
    assert_eq!(manifest.referenced_manifests, ["shipped.manifest", "lib.manifest"]);

    // Unchanged instances stay in the base stream; edited and new ones are written.
    let asset_of = |name: &str| {
        let handle = &s.find_instance(&InstanceHandle::new("Node", name)).unwrap().handle;
        fx.out().join("assets").join(format!("{}.asset", handle.file_base()))
    };
    assert!(!asset_of("z").exists());
    assert!(!asset_of("m").exists());
    assert!(asset_of("a").is_file());
    assert!(asset_of("zz").is_file());
}

#[test]
fn missing_base_stream_fails_the_build() {
    let fx = Fixture::new();
    let root = fx.write("root.xml", r#"<AssetDeclaration><Node id="a"/></AssetDeclaration>"#);
    let mut settings = fx.settings();
    settings.output.base_patch_stream = Some("shipped".to_string());
    let err = session(settings).build(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);
    assert!(err.message.contains("shipped.manifest"));
}

#[test]
fn precompiled_reference_is_not_rebuilt() {
    let fx = Fixture::new();
    let lib = fx.write(
        "lib.xml",
        r#"<AssetDeclaration><Node id="shared"/><Node id="spare"/></AssetDeclaration>"#,
    );
    let root = fx.write(
        "root.xml",
        r#"<AssetDeclaration>
             <Includes><Include type="reference" source="lib.xml"/></Includes>
             <Node id="user" next="shared"/>
           </AssetDeclaration>"#,
    );
    let mut s = session(fx.settings());
    let built = s.build(&lib).unwrap();
    assert_eq!(built.instances_compiled, 2);
    let lib_manifest = load_manifest(&s, &built.manifest);

    let mut settings = fx.settings();
    settings.build.use_precompiled = true;
    let mut s = session(settings);
    let summary = s.build(&root).unwrap();
    assert_eq!(summary.files_parsed, 1);
    assert_eq!(summary.instances_compiled, 1);
    assert_eq!(resolved_references(&s, &InstanceHandle::new("Node", "user")), ["Node:shared"]);

    let manifest = load_manifest(&s, &summary.manifest);
    assert_eq!(entry_names(&manifest), ["Node:user"]);
    assert_eq!(manifest.referenced_manifests, ["lib.manifest"]);
    // The precompiled stream and its assets are left as they were.
    assert_eq!(load_manifest(&s, &built.manifest), lib_manifest);
    for entry in &lib_manifest.entries {
        let path = fx.out().join("assets").join(format!("{}.asset", entry.header.file_base()));
        assert!(path.is_file());
    }
}
