fn main() {
    println!("cargo:rerun-if-changed=ui/");
    slint_build::compile("ui/main_window.slint").expect("Failed to compile Slint UI");
}
