//! [`ArchiveAccessor`] over an Alembic Ogawa file.
//!
//! The object hierarchy and the property tables the converter needs are
//! read once at open; sample payloads are read on demand.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::traits::*;
use crate::core::{MetaData, TimeSampling};
use crate::geom::{CameraSample, XformSample, CAMERA_SCHEMA, XFORM_SCHEMA};
use crate::ogawa::*;
use crate::util::{Error, Result};

/// Root group children of an Alembic archive.
const ROOT_TOP_OBJECT: usize = 2;
const ROOT_METADATA: usize = 3;
const ROOT_TIME_SAMPLINGS: usize = 4;
const ROOT_INDEXED_METADATA: usize = 5;

/// Property marking an Xform as a locator.
const LOCATOR_PROPERTY: &str = "locator";

/// A property header together with the group holding its samples.
#[derive(Clone)]
struct PropRef {
    group: IGroup,
    header: PropertyHeader,
}

/// A compound property's sub-property table.
struct CompoundProps {
    group: IGroup,
    headers: Vec<PropertyHeader>,
}

impl CompoundProps {
    fn read(group: IGroup, indexed: &[MetaData]) -> Result<Self> {
        let headers = match group.num_children() {
            0 => Vec::new(),
            n => read_property_headers(&group.data(n - 1)?, indexed)?,
        };
        Ok(Self { group, headers })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.name == name)
    }

    fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn prop(&self, name: &str) -> Result<Option<PropRef>> {
        let Some(index) = self.position(name) else {
            return Ok(None);
        };
        let header = self.headers[index].clone();
        if header.property_type == PropertyType::Compound {
            return Err(Error::invalid(format!("{} is a compound property", name)));
        }
        Ok(Some(PropRef {
            group: self.group.group(index)?,
            header,
        }))
    }

    fn compound(&self, name: &str, indexed: &[MetaData]) -> Result<Option<CompoundProps>> {
        let Some(index) = self.position(name) else {
            return Ok(None);
        };
        if self.headers[index].property_type != PropertyType::Compound {
            return Err(Error::invalid(format!("{} is not a compound property", name)));
        }
        Ok(Some(CompoundProps::read(self.group.group(index)?, indexed)?))
    }
}

struct XformProps {
    ops: Option<PropRef>,
    vals: Option<PropRef>,
    inherits: Option<PropRef>,
}

enum SchemaProps {
    Plain,
    Xform(XformProps),
    Camera { core: PropRef },
    Broken(String),
}

struct ObjectEntry {
    header: ObjectHeader,
    children: Vec<ObjectId>,
    props: SchemaProps,
    is_locator: bool,
}

impl ObjectEntry {
    fn new(header: ObjectHeader) -> Self {
        Self {
            header,
            children: Vec::new(),
            props: SchemaProps::Plain,
            is_locator: false,
        }
    }
}

/// An opened `.abc` file.
pub struct OgawaArchive {
    name: String,
    streams: Arc<IStreams>,
    objects: Vec<ObjectEntry>,
    time_samplings: Vec<(TimeSampling, u32)>,
    indexed_metadata: Vec<MetaData>,
    metadata: MetaData,
    /// Decoded f64 payloads keyed by (property group, child).
    value_cache: RwLock<HashMap<(u64, usize), Arc<[f64]>>>,
}

impl OgawaArchive {
    /// Open an archive file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_streams(name, Arc::new(IStreams::open(path)?))
    }

    /// Read an archive image held in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        Self::from_streams(name.into(), Arc::new(IStreams::from_bytes(bytes)?))
    }

    fn from_streams(name: String, streams: Arc<IStreams>) -> Result<Self> {
        let root = IGroup::root(streams.clone())?;
        if root.num_children() <= ROOT_TIME_SAMPLINGS {
            return Err(Error::invalid(format!(
                "archive root has {} children",
                root.num_children()
            )));
        }

        let metadata = MetaData::parse(&root.data(ROOT_METADATA)?.read_string()?);
        let time_samplings = read_time_samplings(&root.data(ROOT_TIME_SAMPLINGS)?)?;
        let indexed_metadata = if root.num_children() > ROOT_INDEXED_METADATA {
            read_indexed_metadata(&root.data(ROOT_INDEXED_METADATA)?)?
        } else {
            vec![MetaData::new()]
        };

        let mut archive = Self {
            name,
            streams,
            objects: Vec::new(),
            time_samplings,
            indexed_metadata,
            metadata,
            value_cache: RwLock::new(HashMap::new()),
        };

        let top_group = root.group(ROOT_TOP_OBJECT)?;
        archive.objects.push(ObjectEntry::new(ObjectHeader {
            name: "ABC".to_string(),
            full_name: "/".to_string(),
            metadata: MetaData::new(),
        }));
        archive.load_children(&top_group, ObjectId(0))?;

        debug!(
            archive = %archive.name,
            objects = archive.objects.len(),
            time_samplings = archive.time_samplings.len(),
            "opened Ogawa archive"
        );
        Ok(archive)
    }

    /// Archive-level metadata.
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Time samplings with their maximum sample counts.
    pub fn time_samplings(&self) -> &[(TimeSampling, u32)] {
        &self.time_samplings
    }

    /// Ogawa format version.
    pub fn version(&self) -> u16 {
        self.streams.version()
    }

    fn load_object(&mut self, group: &IGroup, header: ObjectHeader) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(ObjectEntry::new(header));

        let props = match group.num_children() {
            0 => Ok(None),
            _ => group
                .group(0)
                .and_then(|g| CompoundProps::read(g, &self.indexed_metadata))
                .map(Some),
        };
        let resolved = props.and_then(|props| self.resolve_schema(id, props.as_ref()));
        if let Err(e) = resolved {
            self.mark_broken(id, e.to_string());
        }

        if let Err(e) = self.load_children(group, id) {
            self.mark_broken(id, e.to_string());
        }
        id
    }

    fn mark_broken(&mut self, id: ObjectId, reason: String) {
        let entry = &mut self.objects[id.0];
        warn!(object = %entry.header.full_name, %reason, "unreadable object");
        if !matches!(entry.props, SchemaProps::Broken(_)) {
            entry.props = SchemaProps::Broken(reason);
        }
    }

    fn load_children(&mut self, group: &IGroup, id: ObjectId) -> Result<()> {
        let n = group.num_children();
        if n < 2 {
            return Ok(());
        }
        let parent_name = self.objects[id.0].header.full_name.clone();
        let headers = read_object_headers(&group.data(n - 1)?, &parent_name, &self.indexed_metadata)?;
        if headers.len() + 2 != n {
            return Err(Error::invalid(format!(
                "{} child headers for {} child groups",
                headers.len(),
                n - 2
            )));
        }

        for (i, header) in headers.into_iter().enumerate() {
            let child = match group.group(i + 1) {
                Ok(child_group) => self.load_object(&child_group, header),
                Err(e) => {
                    let child = ObjectId(self.objects.len());
                    self.objects.push(ObjectEntry::new(header));
                    self.mark_broken(child, e.to_string());
                    child
                }
            };
            self.objects[id.0].children.push(child);
        }
        Ok(())
    }

    fn resolve_schema(&mut self, id: ObjectId, props: Option<&CompoundProps>) -> Result<()> {
        let schema = self.objects[id.0].header.metadata.schema().map(str::to_owned);
        let indexed = &self.indexed_metadata;

        let (resolved, is_locator) = match (schema.as_deref(), props) {
            (Some(XFORM_SCHEMA), Some(props)) => match props.compound(".xform", indexed)? {
                Some(xform) => {
                    let is_locator = props.has(LOCATOR_PROPERTY) || xform.has(LOCATOR_PROPERTY);
                    let xform = XformProps {
                        ops: xform.prop(".ops")?,
                        vals: xform.prop(".vals")?,
                        inherits: xform.prop(".inherits")?,
                    };
                    if let Some(vals) = &xform.vals {
                        if vals.header.pod != POD_FLOAT64 {
                            return Err(Error::invalid(".vals is not f64"));
                        }
                    }
                    (SchemaProps::Xform(xform), is_locator)
                }
                None => (SchemaProps::Xform(XformProps::none()), props.has(LOCATOR_PROPERTY)),
            },
            (Some(XFORM_SCHEMA), None) => (SchemaProps::Xform(XformProps::none()), false),
            (Some(CAMERA_SCHEMA), props) => {
                let core = props
                    .map(|p| p.compound(".camera", indexed))
                    .transpose()?
                    .flatten()
                    .ok_or_else(|| Error::invalid("missing .camera compound"))?
                    .prop(".core")?
                    .ok_or_else(|| Error::invalid("missing .camera/.core"))?;
                if core.header.pod != POD_FLOAT64 {
                    return Err(Error::invalid(".core is not f64"));
                }
                (SchemaProps::Camera { core }, false)
            }
            _ => (SchemaProps::Plain, false),
        };

        let entry = &mut self.objects[id.0];
        entry.props = resolved;
        entry.is_locator = is_locator;
        Ok(())
    }

    fn entry(&self, id: ObjectId) -> Result<&ObjectEntry> {
        self.objects
            .get(id.0)
            .ok_or_else(|| Error::invalid(format!("unknown object id {}", id.0)))
    }

    fn sampling(&self, index: u32) -> Result<&TimeSampling> {
        self.time_samplings
            .get(index as usize)
            .map(|(ts, _)| ts)
            .ok_or_else(|| Error::invalid(format!("time sampling {} out of range", index)))
    }

    /// Ogawa child holding the sample nearest to `seconds`.
    fn sample_child(&self, prop: &PropRef, seconds: f64) -> Result<usize> {
        let header = &prop.header;
        let ts = self.sampling(header.time_sampling_index)?;
        let index = ts.near_index(seconds, header.num_samples as usize);
        let stored = header.stored_index(index);
        Ok(match header.property_type {
            PropertyType::Array => stored * 2,
            _ => stored,
        })
    }

    fn read_payload(&self, prop: &PropRef, seconds: f64) -> Result<Vec<u8>> {
        if prop.header.num_samples == 0 {
            return Ok(Vec::new());
        }
        let child = self.sample_child(prop, seconds)?;
        let bytes = prop.group.data(child)?.read_all()?;
        Ok(sample_payload(&bytes).to_vec())
    }

    fn read_f64s(&self, prop: &PropRef, seconds: f64) -> Result<Arc<[f64]>> {
        if prop.header.num_samples == 0 {
            return Ok(Arc::from(Vec::new()));
        }
        let key = (prop.group.pos(), self.sample_child(prop, seconds)?);
        if let Some(values) = self.value_cache.read().get(&key) {
            return Ok(values.clone());
        }

        let values: Arc<[f64]> = decode_f64s(&self.read_payload(prop, seconds)?)?.into();
        self.value_cache.write().insert(key, values.clone());
        Ok(values)
    }

    fn broken(entry: &ObjectEntry, reason: &str) -> Error {
        Error::schema(&entry.header.full_name, reason)
    }
}

impl XformProps {
    fn none() -> Self {
        Self {
            ops: None,
            vals: None,
            inherits: None,
        }
    }
}

impl ArchiveAccessor for OgawaArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn top(&self) -> ObjectId {
        ObjectId(0)
    }

    fn describe(&self, id: ObjectId) -> Result<ObjectDescription> {
        let entry = self.entry(id)?;
        Ok(ObjectDescription {
            name: entry.header.name.clone(),
            full_name: entry.header.full_name.clone(),
            schema: entry.header.metadata.schema().map(str::to_owned),
            is_locator: entry.is_locator,
        })
    }

    fn children(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self.entry(id)?.children.clone())
    }

    fn time_range(&self) -> Option<ArchiveTimeRange> {
        let mut span: Option<(f64, f64)> = None;
        let mut frame_rate = None;
        for (ts, max_samples) in &self.time_samplings {
            if *max_samples < 2 {
                continue;
            }
            let (start, end) = ts.time_range(*max_samples as usize);
            span = Some(match span {
                Some((s, e)) => (s.min(start), e.max(end)),
                None => (start, end),
            });
            frame_rate = frame_rate.or_else(|| ts.frame_rate());
        }

        let frame_rate = frame_rate.or_else(|| {
            self.metadata
                .get(MetaData::DCC_FPS_KEY)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|fps| fps.is_finite() && *fps > 0.0)
        });
        span.map(|(start_seconds, end_seconds)| ArchiveTimeRange {
            start_seconds,
            end_seconds,
            frame_rate,
        })
    }

    fn xform_sample(&self, id: ObjectId, seconds: f64) -> Result<XformSample> {
        let entry = self.entry(id)?;
        let xform = match &entry.props {
            SchemaProps::Xform(xform) => xform,
            SchemaProps::Broken(reason) => return Err(Self::broken(entry, reason)),
            SchemaProps::Plain | SchemaProps::Camera { .. } => return Ok(XformSample::identity()),
        };

        let inherits = match &xform.inherits {
            Some(prop) => self
                .read_payload(prop, seconds)?
                .first()
                .map_or(true, |&b| b != 0),
            None => true,
        };

        let codes = match &xform.ops {
            Some(prop) => {
                let mut codes = self.read_payload(prop, seconds)?;
                if prop.header.property_type == PropertyType::Scalar {
                    codes.truncate(prop.header.extent as usize);
                }
                codes
            }
            None => Vec::new(),
        };
        let vals = match &xform.vals {
            Some(prop) => self.read_f64s(prop, seconds)?,
            None => Arc::from(Vec::new()),
        };

        XformSample::decode(&codes, &vals, inherits)
            .map_err(|e| Self::broken(entry, &e.to_string()))
    }

    fn camera_sample(&self, id: ObjectId, seconds: f64) -> Result<CameraSample> {
        let entry = self.entry(id)?;
        match &entry.props {
            SchemaProps::Camera { core } => {
                let values = self.read_f64s(core, seconds)?;
                CameraSample::from_core(&values).map_err(|e| Self::broken(entry, &e.to_string()))
            }
            SchemaProps::Broken(reason) => Err(Self::broken(entry, reason)),
            _ => Err(Self::broken(entry, "not a camera")),
        }
    }

    fn supports_concurrent_reads(&self) -> bool {
        self.streams.is_lock_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogawa::ImageBuilder;
    use crate::util::DVec3;

    const KEY: [u8; 16] = [0u8; 16];

    fn keyed(payload: &[u8]) -> Vec<u8> {
        let mut out = KEY.to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn f64_bytes(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Scalar header with explicit changed indices and time sampling.
    fn scalar_header(out: &mut Vec<u8>, name: &str, pod: u32, extent: u32, samples: u8, ts: u8) {
        let info: u32 = 1 | (pod << 4) | 0x100 | 0x200 | (extent << 12);
        out.extend_from_slice(&info.to_le_bytes());
        let (first, last) = if samples > 1 { (1, samples - 1) } else { (0, 0) };
        out.extend_from_slice(&[samples, first, last, ts]);
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
    }

    fn compound_header(out: &mut Vec<u8>, name: &str) {
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
    }

    fn object_header(out: &mut Vec<u8>, name: &str, schema: &str) {
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0xff);
        let meta = format!("schema={}", schema);
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(meta.as_bytes());
    }

    fn hashes(mut table: Vec<u8>) -> Vec<u8> {
        table.extend_from_slice(&[0u8; 32]);
        table
    }

    /// `/loc1` (animated translate, locator) with camera `/loc1/shape`.
    fn sample_archive() -> Vec<u8> {
        let mut b = ImageBuilder::new();

        // camera shape: .camera/.core constant
        let mut core = [0.0; 16];
        core[0] = 35.0;
        core[1] = 3.6;
        core[3] = 2.4;
        let core_sample = b.data(&keyed(&f64_bytes(&core)));
        let core_group = b.group(&[core_sample]);
        let mut cam_headers = Vec::new();
        scalar_header(&mut cam_headers, ".core", 11, 16, 1, 0);
        let cam_headers = b.data(&cam_headers);
        let camera = b.group(&[core_group, cam_headers]);
        let mut shape_props_headers = Vec::new();
        compound_header(&mut shape_props_headers, ".camera");
        let shape_props_headers = b.data(&shape_props_headers);
        let shape_props = b.group(&[camera, shape_props_headers]);
        let no_children = b.data(&hashes(Vec::new()));
        let shape = b.group(&[shape_props, no_children]);

        // loc1: .xform with .ops [translate], .vals over three frames, locator
        let ops = b.data(&keyed(&[0x10]));
        let ops_group = b.group(&[ops]);
        let vals: Vec<u64> = (1..=3)
            .map(|f| b.data(&keyed(&f64_bytes(&[f as f64, 0.0, -(f as f64)]))))
            .collect();
        let vals_group = b.group(&vals);
        let locator = b.data(&keyed(&f64_bytes(&[0.0; 6])));
        let locator_group = b.group(&[locator]);
        let mut xform_headers = Vec::new();
        scalar_header(&mut xform_headers, ".ops", 1, 1, 1, 0);
        scalar_header(&mut xform_headers, ".vals", 11, 3, 3, 1);
        scalar_header(&mut xform_headers, "locator", 11, 6, 1, 0);
        let xform_headers = b.data(&xform_headers);
        let xform = b.group(&[ops_group, vals_group, locator_group, xform_headers]);
        let mut loc_props_headers = Vec::new();
        compound_header(&mut loc_props_headers, ".xform");
        let loc_props_headers = b.data(&loc_props_headers);
        let loc_props = b.group(&[xform, loc_props_headers]);
        let mut loc_children = Vec::new();
        object_header(&mut loc_children, "shape", CAMERA_SCHEMA);
        let loc_children = b.data(&hashes(loc_children));
        let loc = b.group(&[loc_props, shape, loc_children]);

        // top object
        let mut top_children = Vec::new();
        object_header(&mut top_children, "loc1", XFORM_SCHEMA);
        let top_children = b.data(&hashes(top_children));
        let top = b.group(&[0, loc, top_children]);

        // archive root
        let version = b.data(&1i32.to_le_bytes());
        let file_version = b.data(&10709i32.to_le_bytes());
        let metadata = b.data(b"_ai_Application=test");
        let mut ts = Vec::new();
        ts.extend_from_slice(&1u32.to_le_bytes());
        ts.extend_from_slice(&1.0f64.to_le_bytes());
        ts.extend_from_slice(&1u32.to_le_bytes());
        ts.extend_from_slice(&0.0f64.to_le_bytes());
        ts.extend_from_slice(&3u32.to_le_bytes());
        ts.extend_from_slice(&(1.0f64 / 24.0).to_le_bytes());
        ts.extend_from_slice(&1u32.to_le_bytes());
        ts.extend_from_slice(&(1.0f64 / 24.0).to_le_bytes());
        let ts = b.data(&ts);
        let indexed = b.data(&[]);
        let root = b.group(&[version, file_version, top, metadata, ts, indexed]);
        b.finish(root)
    }

    #[test]
    fn test_hierarchy() {
        let archive = OgawaArchive::from_bytes("scene.abc", sample_archive()).unwrap();
        assert_eq!(archive.name(), "scene.abc");
        assert_eq!(archive.metadata().get(MetaData::APPLICATION_KEY), Some("test"));

        let top_children = archive.children(archive.top()).unwrap();
        assert_eq!(top_children.len(), 1);
        let loc = archive.describe(top_children[0]).unwrap();
        assert_eq!(loc.full_name, "/loc1");
        assert_eq!(loc.schema.as_deref(), Some(XFORM_SCHEMA));
        assert!(loc.is_locator);

        let shape_id = archive.children(top_children[0]).unwrap()[0];
        let shape = archive.describe(shape_id).unwrap();
        assert_eq!(shape.full_name, "/loc1/shape");
        assert_eq!(shape.schema.as_deref(), Some(CAMERA_SCHEMA));
        assert!(!shape.is_locator);
    }

    #[test]
    fn test_time_range() {
        let archive = OgawaArchive::from_bytes("scene.abc", sample_archive()).unwrap();
        let range = archive.time_range().unwrap();
        assert!((range.start_seconds - 1.0 / 24.0).abs() < 1e-12);
        assert!((range.end_seconds - 3.0 / 24.0).abs() < 1e-12);
        assert!((range.frame_rate.unwrap() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_samples() {
        let archive = OgawaArchive::from_bytes("scene.abc", sample_archive()).unwrap();
        let loc = archive.children(archive.top()).unwrap()[0];
        let shape = archive.children(loc).unwrap()[0];

        let m = archive.xform_sample(loc, 2.0 / 24.0).unwrap().matrix();
        assert_eq!(m.w_axis.truncate(), DVec3::new(2.0, 0.0, -2.0));
        // past the end holds the last sample
        let m = archive.xform_sample(loc, 10.0).unwrap().matrix();
        assert_eq!(m.w_axis.truncate(), DVec3::new(3.0, 0.0, -3.0));

        let cam = archive.camera_sample(shape, 0.0).unwrap();
        assert_eq!(cam.focal_length, 35.0);
        assert_eq!(cam.vertical_aperture, 2.4);
        assert_eq!(archive.xform_sample(shape, 0.0).unwrap(), XformSample::identity());
        assert!(archive.camera_sample(loc, 0.0).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample_archive();
        bytes[0] = b'X';
        assert!(matches!(
            OgawaArchive::from_bytes("bad.abc", bytes),
            Err(Error::InvalidMagic)
        ));
    }

    #[test]
    fn test_converts_file_to_script() {
        use crate::convert::{ConvertOptions, Converter, Outcome};

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scene.abc");
        let output = dir.path().join("scene.jsx");
        std::fs::write(&input, sample_archive()).unwrap();

        let outcome = Converter::default().convert(&input, &output, &ConvertOptions::default());
        let report = match outcome {
            Outcome::Success(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(report.composition_name, "scene");
        assert_eq!((report.grid.start_frame, report.grid.end_frame), (1, 3));
        assert_eq!(report.layers, 2);

        let script = std::fs::read_to_string(&output).unwrap();
        assert!(script.contains("abcComp(\"scene\", 1920, 1080, 1, 3, 24, 1);"));
        assert!(script.contains("layer = abcNull(comp, \"loc1\");"));
        assert!(script.contains("abcKey(layer, \"Position\", 2, [2.000000, 0, -2.000000]);"));
        assert!(script.contains("layer = abcCamera(comp, \"shape\");"));
    }

    #[test]
    fn test_missing_file() {
        let err = OgawaArchive::open("/definitely/not/here.abc").err().unwrap();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
