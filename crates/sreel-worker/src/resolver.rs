//! Image resolution for one segment: cache lookup, provider
//! generation, and the multi-tier fallback cascade.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use sreel_cache::{
    find_reusable_scene_image, force_llm_select_scene_image, render_cached_image_to_output,
    SceneCacheIndex, SceneDescriptor, SceneMatch,
};
use sreel_llm::{ImageClient, ImageGenError, LlmClient};
use sreel_models::ImageSource;

use crate::error::{WorkerError, WorkerResult};

/// Extensions accepted for reference-image copies.
const REFERENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Outcome of resolving one segment's frame.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub source: ImageSource,
    /// Cache entry involved: the reused entry, or the entry a fresh
    /// generation was persisted under
    pub cache_entry_id: Option<String>,
}

/// Inputs for one resolution.
pub struct ImageRequest<'a> {
    pub descriptor: &'a SceneDescriptor,
    pub prompt: &'a str,
    /// Up to two reference images (primary + one related)
    pub reference_paths: Vec<PathBuf>,
    pub aspect_ratio: Option<&'a str>,
    pub output_path: &'a Path,
    pub enable_scene_reuse: bool,
    /// No-repeat ring contents
    pub disallow_entry_ids: &'a HashSet<String>,
    pub model_id: Option<&'a str>,
}

/// Resolve the frame for one segment.
///
/// Cache lookup first (when reuse is enabled), then provider
/// generation, then the fallback cascade: lenient LLM pick, random
/// same-character entry, the character's own reference copy, random
/// scene-only entry, any random entry. Only when every tier fails does
/// the segment fail.
pub async fn resolve_segment_image(
    cache: &Arc<SceneCacheIndex>,
    llm: &LlmClient,
    image_client: &ImageClient,
    request: &ImageRequest<'_>,
) -> WorkerResult<ResolvedImage> {
    if request.enable_scene_reuse {
        let matched = find_reusable_scene_image(
            cache,
            llm,
            request.descriptor,
            request.disallow_entry_ids,
            request.model_id,
        )
        .await?;
        if let Some(hit) = matched {
            info!(
                match_type = hit.match_type.as_str(),
                confidence = hit.confidence,
                reason = %hit.reason,
                "Scene cache hit"
            );
            return materialize(request.output_path, &hit, ImageSource::Cache);
        }
    }

    let reference_refs: Vec<&Path> = request
        .reference_paths
        .iter()
        .map(PathBuf::as_path)
        .filter(|path| path.exists())
        .take(2)
        .collect();

    match image_client
        .generate(
            request.prompt,
            &reference_refs,
            request.aspect_ratio,
            request.output_path,
        )
        .await
    {
        Ok(()) => {
            let cache_entry_id = if request.enable_scene_reuse {
                persist_generated(cache, request).await
            } else {
                None
            };
            Ok(ResolvedImage {
                path: request.output_path.to_path_buf(),
                source: ImageSource::Generated,
                cache_entry_id,
            })
        }
        Err(generation_error) => {
            warn!(
                error = %generation_error,
                "Image generation failed, entering fallback cascade"
            );
            fallback_cascade(cache, llm, request, generation_error).await
        }
    }
}

/// Persist a freshly generated frame into the scene cache. Best
/// effort: a failed insert only loses future reuse.
async fn persist_generated(
    cache: &Arc<SceneCacheIndex>,
    request: &ImageRequest<'_>,
) -> Option<String> {
    let cache = Arc::clone(cache);
    let descriptor = request.descriptor.clone();
    let source = request.output_path.to_path_buf();
    let summary = descriptor.action_hint.clone();

    let saved = tokio::task::spawn_blocking(move || cache.save_entry(&descriptor, &source, &summary))
        .await;
    match saved {
        Ok(Ok(entry)) => Some(entry.id),
        Ok(Err(err)) => {
            warn!(error = %err, "Failed to persist generated image into scene cache");
            None
        }
        Err(err) => {
            warn!(error = %err, "Scene cache persist task failed");
            None
        }
    }
}

async fn fallback_cascade(
    cache: &Arc<SceneCacheIndex>,
    llm: &LlmClient,
    request: &ImageRequest<'_>,
    generation_error: ImageGenError,
) -> WorkerResult<ResolvedImage> {
    // a. Lenient LLM pick over the widened shortlist.
    let forced = force_llm_select_scene_image(
        cache,
        llm,
        request.descriptor,
        request.disallow_entry_ids,
        request.model_id,
    )
    .await?;
    if let Some(hit) = forced {
        info!(reason = %hit.reason, "Fallback used forced-LLM scene pick");
        return materialize(request.output_path, &hit, ImageSource::FallbackLlm);
    }

    // b. Random cached entry for the same character.
    if let Some(entry) = cache.random_character_match(
        &request.descriptor.character_name,
        &request.descriptor.reference_image_paths,
        request.disallow_entry_ids,
    )? {
        warn!(entry_id = %entry.id, "Fallback used random same-character cache entry");
        render_cached_image_to_output(&entry.image_path, request.output_path)?;
        return Ok(ResolvedImage {
            path: request.output_path.to_path_buf(),
            source: ImageSource::FallbackCharacterCache,
            cache_entry_id: Some(entry.id),
        });
    }

    // c. The character's own reference image, copied verbatim.
    if let Some(reference) = request.reference_paths.iter().find(|path| {
        path.exists()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| REFERENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
    }) {
        warn!(reference = %reference.display(), "Fallback used character reference image");
        render_cached_image_to_output(reference, request.output_path)?;
        return Ok(ResolvedImage {
            path: request.output_path.to_path_buf(),
            source: ImageSource::FallbackReference,
            cache_entry_id: None,
        });
    }

    // d. Random scene-only entry.
    if let Some(entry) = cache.random_scene_only(request.disallow_entry_ids)? {
        warn!(entry_id = %entry.id, "Fallback used random scene-only cache entry");
        render_cached_image_to_output(&entry.image_path, request.output_path)?;
        return Ok(ResolvedImage {
            path: request.output_path.to_path_buf(),
            source: ImageSource::FallbackSceneOnlyCache,
            cache_entry_id: Some(entry.id),
        });
    }

    // e. Any random live entry.
    if let Some(entry) = cache.random_any(request.disallow_entry_ids)? {
        warn!(entry_id = %entry.id, "Fallback used random cache entry");
        render_cached_image_to_output(&entry.image_path, request.output_path)?;
        return Ok(ResolvedImage {
            path: request.output_path.to_path_buf(),
            source: ImageSource::FallbackRandomCache,
            cache_entry_id: Some(entry.id),
        });
    }

    warn!(error = %generation_error, "Every image fallback tier failed");
    Err(WorkerError::ImageUnresolvable)
}

fn materialize(
    output_path: &Path,
    hit: &SceneMatch,
    source: ImageSource,
) -> WorkerResult<ResolvedImage> {
    render_cached_image_to_output(&hit.image_path, output_path)?;
    Ok(ResolvedImage {
        path: output_path.to_path_buf(),
        source,
        cache_entry_id: Some(hit.entry_id.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sreel_cache::build_scene_descriptor;
    use sreel_models::Character;

    fn png_at(path: &Path) {
        let img = image_bytes();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, img).unwrap();
    }

    // Minimal valid PNG (1x1 white pixel), so RGB re-encode works.
    fn image_bytes() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn descriptor_for(name: &str, reference: Option<&str>) -> SceneDescriptor {
        let mut character = Character::narrator();
        character.name = name.to_string();
        character.reference_image_path = reference.map(|s| s.to_string());
        build_scene_descriptor(
            &character,
            &[],
            "段落",
            "动作",
            "",
            &[],
            &[],
            &[],
            "",
            "",
            false,
        )
    }

    fn disabled_clients() -> (LlmClient, ImageClient) {
        (
            LlmClient::new("http://localhost:1", "", "m"),
            ImageClient::new("http://localhost:1", "", "m"),
        )
    }

    #[tokio::test]
    async fn test_cascade_reaches_reference_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            SceneCacheIndex::open(dir.path().join("c.db"), dir.path().join("imgs")).unwrap(),
        );
        let (llm, image_client) = disabled_clients();

        let reference = dir.path().join("refs/hero_ref_a1.png");
        png_at(&reference);
        let descriptor = descriptor_for("甲", reference.to_str());
        let output = dir.path().join("out/segment_0000.png");

        let disallow = HashSet::new();
        let request = ImageRequest {
            descriptor: &descriptor,
            prompt: "a hero",
            reference_paths: vec![reference.clone()],
            aspect_ratio: None,
            output_path: &output,
            enable_scene_reuse: true,
            disallow_entry_ids: &disallow,
            model_id: None,
        };

        // Provider disabled and cache empty: only the reference copy
        // tier can satisfy this request.
        let resolved = resolve_segment_image(&cache, &llm, &image_client, &request)
            .await
            .unwrap();
        assert_eq!(resolved.source, ImageSource::FallbackReference);
        assert!(resolved.cache_entry_id.is_none());
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_cascade_prefers_character_cache_over_reference() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            SceneCacheIndex::open(dir.path().join("c.db"), dir.path().join("imgs")).unwrap(),
        );
        let (llm, image_client) = disabled_clients();

        let source = dir.path().join("seed.png");
        png_at(&source);
        let cached = descriptor_for("甲", None);
        let saved = cache.save_entry(&cached, &source, "").unwrap();

        let reference = dir.path().join("refs/hero_ref_a1.png");
        png_at(&reference);
        let descriptor = descriptor_for("甲", reference.to_str());
        let output = dir.path().join("out/segment_0000.png");

        let disallow = HashSet::new();
        let request = ImageRequest {
            descriptor: &descriptor,
            prompt: "a hero",
            reference_paths: vec![reference],
            aspect_ratio: None,
            output_path: &output,
            enable_scene_reuse: false,
            disallow_entry_ids: &disallow,
            model_id: None,
        };

        let resolved = resolve_segment_image(&cache, &llm, &image_client, &request)
            .await
            .unwrap();
        assert_eq!(resolved.source, ImageSource::FallbackCharacterCache);
        assert_eq!(resolved.cache_entry_id, Some(saved.id));
    }

    #[tokio::test]
    async fn test_cascade_exhaustion_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            SceneCacheIndex::open(dir.path().join("c.db"), dir.path().join("imgs")).unwrap(),
        );
        let (llm, image_client) = disabled_clients();

        let descriptor = descriptor_for("甲", None);
        let output = dir.path().join("out/segment_0000.png");
        let disallow = HashSet::new();
        let request = ImageRequest {
            descriptor: &descriptor,
            prompt: "a hero",
            reference_paths: Vec::new(),
            aspect_ratio: None,
            output_path: &output,
            enable_scene_reuse: true,
            disallow_entry_ids: &disallow,
            model_id: None,
        };

        let err = resolve_segment_image(&cache, &llm, &image_client, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ImageUnresolvable));
    }
}
