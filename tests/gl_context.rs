// This is free and unencumbered software released into the public domain.

mod common;

use atalk_camera_module::shared::{
    CameraSurfaceRenderer, CodecInputSurface, GlBackend, GlError, NativeWindow, OpenGlContext,
    Size,
};
use common::*;
use std::{
    sync::{Arc, atomic::Ordering, mpsc},
    thread,
    time::{Duration, Instant},
};

const PREVIEW: NativeWindow = NativeWindow(0xA0);
const ENCODER: NativeWindow = NativeWindow(0xE0);

#[test]
fn context_is_destroyed_exactly_once() {
    let gl = FakeGl::new(Size::new(640, 480));
    let context = OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap();
    assert_eq!(context.window(), PREVIEW);

    assert!(context.release());
    assert!(context.is_released());
    assert!(!context.release());
    drop(context);

    assert_eq!(gl.contexts_destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(gl.log(), vec!["destroy_context".to_string()]);
}

#[test]
fn dropping_an_unreleased_context_destroys_it() {
    let gl = FakeGl::new(Size::new(640, 480));
    drop(OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap());
    assert_eq!(gl.contexts_destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn released_context_cannot_be_made_current_or_shared() {
    let gl = FakeGl::new(Size::new(640, 480));
    let context = OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap();
    context.release();

    assert!(matches!(context.make_current(), Err(GlError::Released)));
    assert!(matches!(
        CodecInputSurface::new(gl.clone(), ENCODER, &context),
        Err(GlError::Released)
    ));
    assert_eq!(gl.make_current_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn current_token_releases_on_drop() {
    let gl = FakeGl::new(Size::new(1280, 720));
    let context = OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap();
    {
        let current = context.make_current().unwrap();
        assert_eq!(current.surface_size().unwrap(), Size::new(1280, 720));
        current.set_presentation_time(42).unwrap();
        current.swap_buffers().unwrap();
        assert_eq!(gl.release_current_calls.load(Ordering::SeqCst), 0);
    }
    assert_eq!(gl.make_current_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gl.release_current_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*gl.presentation_times.lock().unwrap(), vec![42]);
    assert_eq!(gl.swaps.load(Ordering::SeqCst), 1);
}

#[test]
fn encoder_context_joins_the_preview_share_group() {
    let gl = FakeGl::new(Size::new(640, 480));
    let preview = OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap();
    let other = OpenGlContext::new(gl.clone(), false, NativeWindow(0xB0), None).unwrap();
    let encoder = CodecInputSurface::new(gl.clone(), ENCODER, &preview).unwrap();

    assert!(encoder.context().shares_group_with(&preview));
    assert!(!other.shares_group_with(&preview));

    encoder.release();
    assert_eq!(gl.log(), vec!["destroy_encoder_context".to_string()]);
}

#[test]
fn share_group_is_current_on_one_thread_at_a_time() {
    let gl = FakeGl::new(Size::new(640, 480));
    let preview = Arc::new(OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap());
    let encoder = CodecInputSurface::new(gl.clone(), ENCODER, &preview).unwrap();

    let (held_tx, held_rx) = mpsc::channel();
    let holder = {
        let preview = Arc::clone(&preview);
        thread::spawn(move || {
            let _current = preview.make_current().unwrap();
            held_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
        })
    };

    held_rx.recv().unwrap();
    let started = Instant::now();
    let current = encoder.make_current().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(90));
    drop(current);
    holder.join().unwrap();
}

#[test]
fn renderer_draws_over_the_current_surface() {
    let gl = FakeGl::new(Size::new(720, 1280));
    let preview = OpenGlContext::new(gl.clone(), false, PREVIEW, None).unwrap();
    let encoder = CodecInputSurface::new(gl.clone(), ENCODER, &preview).unwrap();
    let mut renderer = CameraSurfaceRenderer::new();
    assert!(matches!(renderer.texture_id(), Err(GlError::NotInitialized)));

    let current = encoder.make_current().unwrap();
    let texture_id = gl.create_external_texture().unwrap();
    let texture = gl.create_surface_texture(texture_id).unwrap();
    assert!(matches!(
        renderer.draw_frame(&current, texture.as_ref()),
        Err(GlError::NotInitialized)
    ));

    renderer.surface_created(&current).unwrap();
    assert!(renderer.texture_id().is_ok());
    renderer.draw_frame(&current, texture.as_ref()).unwrap();
    assert_eq!(*gl.draws.lock().unwrap(), vec![Size::new(720, 1280)]);

    renderer.release(&current);
    drop(current);
    assert!(matches!(renderer.texture_id(), Err(GlError::NotInitialized)));
    let log = gl.log();
    assert_eq!(log, vec!["delete_program".to_string(), "delete_texture".to_string()]);
}
