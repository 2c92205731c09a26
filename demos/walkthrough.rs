//! A scripted walk through the allocator.
//!
//! Run with `RUST_LOG=trace` (or `debug`) to watch the region come up,
//! blocks split and coalesce, and the region grow:
//!
//! ```text
//! RUST_LOG=debug cargo run --example walkthrough
//! ```

use tagalloc::Heap;

/// Allocates and echoes the result, `malloc`-tracing style.
unsafe fn print_allocate(
  heap: &mut Heap,
  n_bytes: usize,
) -> *mut u8 {
  let ptr = unsafe { heap.allocate(n_bytes) };
  println!("allocate({}) = {:?}", n_bytes, ptr);
  ptr
}

fn print_report(heap: &Heap) {
  match heap.check() {
    Ok(report) => println!(
      "  region: {} words, {} blocks, {} free ({} words)",
      report.region_words, report.blocks, report.free_blocks, report.free_words
    ),
    Err(err) => println!("  heap inconsistent: {}", err),
  }
  heap.log_blocks();
}

fn main() {
  env_logger::init();

  let mut heap = Heap::new();

  unsafe {
    // --------------------------------------------------------------------
    // 1) Small allocations carve the front of the starter chunk.
    // --------------------------------------------------------------------
    println!("\n[1] Two small allocations");
    let first = print_allocate(&mut heap, 4);
    let second = print_allocate(&mut heap, 10);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 2) A large allocation outgrows the starter chunk: the region is
    //    extended and the trailing free run is absorbed.
    // --------------------------------------------------------------------
    println!("\n[2] Allocate 10000 bytes (forces an extension)");
    let big = print_allocate(&mut heap, 10000);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 3) Release the middle allocation: a hole opens, nothing coalesces.
    // --------------------------------------------------------------------
    println!("\n[3] Release the second allocation");
    heap.release(second);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 4) Release its left neighbor: the two holes melt into one.
    // --------------------------------------------------------------------
    println!("\n[4] Release the first allocation (coalesces with the hole)");
    heap.release(first);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 5) Resize the big allocation down; the shed tail joins the free
    //    run behind it.
    // --------------------------------------------------------------------
    println!("\n[5] Shrink the big allocation to 2000 bytes");
    let big = heap.resize(big, 2000);
    println!("resize -> {:?}", big);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 6) A zeroed allocation reuses the dirty front hole.
    // --------------------------------------------------------------------
    println!("\n[6] zero_allocate(4, 8) reuses the front of the region");
    let zeroed = heap.zero_allocate(4, 8);
    println!("zero_allocate(4, 8) = {:?}", zeroed);
    let mut all_zero = true;
    for i in 0..32 {
      all_zero &= *zeroed.add(i) == 0;
    }
    println!("  payload zeroed: {}", all_zero);
    print_report(&heap);

    // --------------------------------------------------------------------
    // 7) Clean up; the heap folds back into large free runs.
    // --------------------------------------------------------------------
    println!("\n[7] Release everything");
    heap.release(zeroed);
    heap.release(big);
    print_report(&heap);
  }
}
