//! Evasion scripts, injected in this order before any page script runs.
//! Each reads its values from the frozen `window.__wf` bootstrap.

pub(crate) const EVASIONS: &[(&str, &str)] = &[
    ("cdp_evasion", CDP_EVASION),
    ("navigator_webdriver", NAVIGATOR_WEBDRIVER),
    ("navigator_languages", NAVIGATOR_LANGUAGES),
    ("navigator_plugins", NAVIGATOR_PLUGINS),
    ("navigator_permissions", NAVIGATOR_PERMISSIONS),
    ("hardware", HARDWARE),
    ("webgl_vendor", WEBGL_VENDOR),
    ("canvas_noise", CANVAS_NOISE),
    ("chrome_runtime", CHROME_RUNTIME),
];

const CDP_EVASION: &str = r"
(() => {
    for (const key of Object.keys(window)) {
        if (/^cdc_[a-zA-Z0-9]+_(Array|Promise|Symbol|JSON|Object|Proxy)$/.test(key)) {
            delete window[key];
        }
    }
})();
";

const NAVIGATOR_WEBDRIVER: &str = r"
(() => {
    const proto = Object.getPrototypeOf(navigator);
    if ('webdriver' in proto) {
        Object.defineProperty(proto, 'webdriver', { get: () => false, configurable: true });
    }
})();
";

const NAVIGATOR_LANGUAGES: &str = r"
(() => {
    const cfg = window.__wf;
    Object.defineProperty(Object.getPrototypeOf(navigator), 'languages', {
        get: () => Object.freeze([...cfg.languages]),
        configurable: true
    });
    Object.defineProperty(Object.getPrototypeOf(navigator), 'platform', {
        get: () => cfg.platform,
        configurable: true
    });
})();
";

const NAVIGATOR_PLUGINS: &str = r"
(() => {
    if (navigator.plugins && navigator.plugins.length > 0) return;
    const data = [
        { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }
    ];
    const proto = Object.getPrototypeOf(navigator.plugins);
    const plugins = Object.create(proto);
    data.forEach((p, i) => {
        plugins[i] = p;
        plugins[p.name] = p;
    });
    Object.defineProperty(plugins, 'length', { value: data.length });
    plugins.item = (i) => plugins[i] || null;
    plugins.namedItem = (n) => plugins[n] || null;
    Object.defineProperty(Object.getPrototypeOf(navigator), 'plugins', {
        get: () => plugins,
        configurable: true
    });
})();
";

const NAVIGATOR_PERMISSIONS: &str = r"
(() => {
    if (!navigator.permissions || !navigator.permissions.query) return;
    const original = navigator.permissions.query.bind(navigator.permissions);
    navigator.permissions.query = (params) =>
        params && params.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission, onchange: null })
            : original(params);
})();
";

const HARDWARE: &str = r"
(() => {
    const cfg = window.__wf;
    Object.defineProperty(Object.getPrototypeOf(navigator), 'hardwareConcurrency', {
        get: () => cfg.hardwareConcurrency,
        configurable: true
    });
    Object.defineProperty(screen, 'width', { get: () => cfg.screenWidth });
    Object.defineProperty(screen, 'height', { get: () => cfg.screenHeight });
    Object.defineProperty(screen, 'availWidth', { get: () => cfg.screenWidth });
    Object.defineProperty(screen, 'availHeight', { get: () => cfg.screenHeight - 40 });
})();
";

const WEBGL_VENDOR: &str = r"
(() => {
    const cfg = window.__wf;
    const handler = {
        apply(target, ctx, args) {
            const param = args && args[0];
            if (param === 37445) return cfg.webglVendor;
            if (param === 37446) return cfg.webglRenderer;
            return Reflect.apply(target, ctx, args);
        }
    };
    for (const ctor of [window.WebGLRenderingContext, window.WebGL2RenderingContext]) {
        if (ctor) {
            ctor.prototype.getParameter = new Proxy(ctor.prototype.getParameter, handler);
        }
    }
})();
";

const CANVAS_NOISE: &str = r"
(() => {
    const seed = window.__wf.sessionSeed;
    let h = 0;
    for (let i = 0; i < seed.length; i++) h = (h * 31 + seed.charCodeAt(i)) | 0;
    const original = CanvasRenderingContext2D.prototype.getImageData;
    CanvasRenderingContext2D.prototype.getImageData = function (...args) {
        const image = original.apply(this, args);
        for (let i = 0; i < image.data.length; i += 97) {
            image.data[i] = image.data[i] ^ ((h >> (i % 24)) & 1);
        }
        return image;
    };
})();
";

const CHROME_RUNTIME: &str = r"
(() => {
    if (!window.chrome) window.chrome = {};
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: () => ({
                onMessage: { addListener() {}, removeListener() {} },
                postMessage() {}
            }),
            sendMessage() {}
        };
    }
    if (!window.chrome.app) {
        window.chrome.app = { isInstalled: false };
    }
})();
";
