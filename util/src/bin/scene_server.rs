//! A demonstration instrumented application: serves an animated test scene
//! to any connected viewers and can record the same stream to disk.

use clap::{Arg, Command};
use ember::logging;
use scry::messages::rgba;
use scry::prelude::*;
use scry::shapes::{MeshSet, UF_LIMITED_ATTRIBUTES, UF_POSITION};
use std::sync::Arc;
use std::time::Duration;

fn build_grid_mesh() -> MeshResource {
    let mut mesh = MeshResource::new(1, DrawType::Triangles);
    let size = 10i32;
    let mut vertices = Vec::new();
    for y in -size..=size {
        for x in -size..=size {
            vertices.push([x as f32 * 0.5, y as f32 * 0.5, 0.0]);
        }
    }
    let stride = (2 * size + 1) as u32;
    let mut indices = Vec::new();
    for y in 0..2 * size as u32 {
        for x in 0..2 * size as u32 {
            let base = y * stride + x;
            indices.extend_from_slice(&[base, base + 1, base + stride]);
            indices.extend_from_slice(&[base + 1, base + stride + 1, base + stride]);
        }
    }
    mesh.add_vertices(&vertices);
    mesh.add_indices(&indices);
    mesh.set_tint(rgba(128, 128, 128, 255));
    mesh
}

fn main() {
    let matches = Command::new("scene_server")
        .about("Serves an animated debug visualization test scene")
        .arg(
            Arg::new("record")
                .long("record")
                .value_name("PATH")
                .help("Record the stream to the given file"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .value_name("COUNT")
                .default_value("0")
                .help("Stop after this many frames, zero to run until interrupted"),
        )
        .get_matches();

    let log = logging::term_logger();
    let server = Server::new(ServerSettings::default(), None, &log);
    let monitor = server.connection_monitor().clone();

    if !monitor.start(MonitorMode::Asynchronous) {
        logging::crit!(log, "failed to start the connection monitor";
                       "error" => monitor.last_error_code());
        std::process::exit(1);
    }
    println!("Listening on port {}", monitor.port());

    if let Some(path) = matches.get_one::<String>("record") {
        monitor.open_file_stream(path).expect("Failed to open the recording");
        println!("Recording to {}", path);
    }

    let frame_limit: u32 = matches
        .get_one::<String>("frames")
        .unwrap()
        .parse()
        .expect("frames must be a number");

    let grid = Arc::new(build_grid_mesh());
    let mut frame = 0u32;

    // Every connection, initial or late joining, receives the persistent
    // scene through the commit callback exactly once.
    {
        let grid = Arc::clone(&grid);
        server.set_connection_callback(move |_server, connection| {
            let floor: Shape = MeshSet::new(2)
                .with_part(Arc::clone(&grid), Attributes::default())
                .into();
            connection.create(&floor);
            connection
                .create(&Shape::sphere(1, Vector3::ZERO, 1.0).with_colour(rgba(0, 128, 255, 255)));
        });
    }
    monitor.commit_connections(&server);

    while frame_limit == 0 || frame < frame_limit {
        let t = f64::from(frame) * 0.033;

        // Bob the sphere with a limited attribute update.
        let mut sphere = Shape::sphere(1, Vector3::new(0.0, 0.0, 1.0 + 0.5 * t.sin()), 1.0);
        sphere.core_mut().flags |= UF_LIMITED_ATTRIBUTES | UF_POSITION;
        server.update(&sphere);

        // A transient marker orbiting the scene, remade every frame.
        let orbit = Shape::star(
            0,
            Vector3::new(3.0 * t.cos(), 3.0 * t.sin(), 1.5),
            0.25,
        )
        .with_colour(rgba(255, 128, 0, 255));
        server.create(&orbit);

        server.update_transfers(64_000);
        server.update_frame(0.033, true);
        std::thread::sleep(Duration::from_millis(33));
        frame += 1;
    }

    server.close();
}
